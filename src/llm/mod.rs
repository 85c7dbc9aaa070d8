pub mod contract;
pub mod invoker;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod types;
