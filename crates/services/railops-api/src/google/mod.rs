pub mod credentials;
pub mod drive;
pub mod oauth;
pub mod sheets;

pub use credentials::{ServiceAccountKey, ServiceAccounts};
pub use drive::{DriveDispatcher, UploadPlan};
pub use oauth::OAuthService;
pub use sheets::{SheetsClient, SheetsError};
