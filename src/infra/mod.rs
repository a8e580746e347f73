pub mod hub;

pub use hub::HubRuntime;
