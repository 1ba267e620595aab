pub mod vault;

pub use vault::{Vault, VaultError, DEV_DEFAULT_KEY};
