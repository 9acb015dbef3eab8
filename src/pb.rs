//! Generated protobuf and gRPC bindings. The module tree mirrors the
//! protobuf packages so cross-package references resolve.

pub mod sf {
    pub mod firehose {
        pub mod v2 {
            tonic::include_proto!("sf.firehose.v2");
        }
    }

    pub mod ethereum {
        pub mod r#type {
            pub mod v2 {
                tonic::include_proto!("sf.ethereum.r#type.v2");
            }
        }

        pub mod transform {
            pub mod v1 {
                tonic::include_proto!("sf.ethereum.transform.v1");
            }
        }
    }
}

pub mod firehose {
    pub mod events {
        pub mod v1 {
            tonic::include_proto!("firehose.events.v1");
        }
    }
}

pub use firehose::events::v1 as events;
pub use sf::ethereum::r#type::v2 as eth;
pub use sf::ethereum::transform::v1 as transform;
pub use sf::firehose::v2 as fh;

/// Type URL of the Ethereum block payload carried in `sf.firehose.v2.Response.block`.
pub const ETH_BLOCK_TYPE_URL: &str = "type.googleapis.com/sf.ethereum.type.v2.Block";

/// Type URL of the upstream log filter transform.
pub const COMBINED_FILTER_TYPE_URL: &str =
    "type.googleapis.com/sf.ethereum.transform.v1.CombinedFilter";
