pub mod schema;
pub mod state;
pub mod store;
#[cfg(test)]
pub mod test_utils;
pub mod utils;

pub use state::AppState;
pub use store::{HealthProbe, PgStore, Store, StoreError};
pub use utils::{create_conn, digits_only, run_migrations, DbPool};
