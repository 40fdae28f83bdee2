pub mod supply;

pub use supply::{
    DeleteSupply, ProcessSupply, RegisterSupply, Supply, SupplyCommand, SupplyDeleted,
    SupplyEvent, SupplyProcessed, SupplyRegistered, SupplyState, SupplyStatus,
};
