use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Branch, Category, Customer, Employee, Product};

/// Read access to the hosted backend tables the cached resources need.
///
/// Failures must come back as `Err`, never as an empty sentinel, so the
/// resource error path runs.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_branches(&self) -> Result<Vec<Branch>>;

    async fn fetch_categories(&self) -> Result<Vec<Category>>;

    /// Products stocked by one branch.
    async fn fetch_products(&self, branch_id: &str) -> Result<Vec<Product>>;

    /// Employees, optionally restricted to one branch.
    async fn fetch_employees(&self, branch_id: Option<&str>) -> Result<Vec<Employee>>;

    async fn fetch_customers(&self) -> Result<Vec<Customer>>;
}
