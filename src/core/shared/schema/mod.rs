pub mod channels;
pub mod core;
pub mod crm;
pub mod demand_board;
pub mod finance;

pub use self::channels::*;
pub use self::core::*;
pub use self::crm::*;
pub use self::demand_board::*;
pub use self::finance::*;
