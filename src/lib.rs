pub mod core;
pub mod crm;
pub mod demands;
pub mod finance;
pub mod integrations;
pub mod main_module;
pub mod security;
pub mod tenancy;
pub mod webhooks;
