pub mod clock;
pub mod db;
pub mod id;
pub mod model;

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::{SecretStore, DEFAULT_VALID_FOR_DAYS, MAX_VALID_FOR_DAYS};
pub use id::derive_id;
pub use model::{Endpoints, HiddenEntryInfo, SecretRecord, StoreEntryInfo, HIDDEN_SECRET};
