//! Domain providers backed by time distribution providers

mod extent;

pub use extent::ExtentDomainProvider;
