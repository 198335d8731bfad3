pub mod common;
pub mod exec;
pub mod mysql;
pub mod secret;

pub use common::{
    API_VERSION, FIELD_MANAGER, KIND, MIRROR_SECRET_PREFIX, mirror_secret_name, owner_reference,
    standard_labels,
};
