//! Data models for back-office entities.
//!
//! These mirror the rows served by the hosted backend tables:
//!
//! - `Branch`: store locations
//! - `Category`: product categories
//! - `Product`: catalog entries, stocked per branch
//! - `Employee`, `Customer`: people records

pub mod catalog;
pub mod organization;
pub mod person;

pub use catalog::{Category, Product};
pub use organization::Branch;
pub use person::{Customer, Employee};
