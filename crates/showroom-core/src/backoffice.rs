//! Cached back-office resources.
//!
//! Each wrapper fixes a cache key, a TTL and a fetcher that queries the
//! backend and tidies the rows. The caching behaviour itself is all
//! `CachedResource`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::api::Backend;
use crate::cache::CacheManager;
use crate::models::{Branch, Category, Customer, Employee, Product};
use crate::resource::{fetcher, Cacheable, CachedResource, Fetcher, ResourceOptions};

pub const BRANCHES_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const CATEGORIES_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const PRODUCTS_TTL: Duration = Duration::from_secs(2 * 60 * 60);
pub const EMPLOYEES_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const CUSTOMERS_TTL: Duration = Duration::from_secs(2 * 60 * 60);

pub const BRANCHES_KEY: &str = "branches";
pub const CATEGORIES_KEY: &str = "categories";
pub const CUSTOMERS_KEY: &str = "customers";

pub fn products_key(branch_id: &str) -> String {
    format!("products_{}", branch_id)
}

pub fn employees_key(branch_id: Option<&str>) -> String {
    format!("employees_{}", branch_id.unwrap_or("all"))
}

/// Backend plus cache, handing out one cached resource per dataset.
#[derive(Clone)]
pub struct BackOffice {
    backend: Arc<dyn Backend>,
    manager: CacheManager,
}

impl BackOffice {
    pub fn new(backend: Arc<dyn Backend>, manager: CacheManager) -> Self {
        Self { backend, manager }
    }

    pub fn manager(&self) -> &CacheManager {
        &self.manager
    }

    pub async fn branches(&self, options: ResourceOptions<Vec<Branch>>) -> CachedResource<Vec<Branch>> {
        self.branches_resource(options).start().await
    }

    /// The branches resource, not yet loaded.
    pub fn branches_resource(&self, options: ResourceOptions<Vec<Branch>>) -> CachedResource<Vec<Branch>> {
        let backend = Arc::clone(&self.backend);
        let fetch = fetcher(move || {
            let backend = Arc::clone(&backend);
            async move {
                let rows = backend
                    .fetch_branches()
                    .await
                    .context("Failed to fetch branches")?;
                Ok(sort_branches(rows))
            }
        });
        self.build(BRANCHES_KEY.to_string(), fetch, options, BRANCHES_TTL)
    }

    pub async fn categories(&self, options: ResourceOptions<Vec<Category>>) -> CachedResource<Vec<Category>> {
        self.categories_resource(options).start().await
    }

    pub fn categories_resource(&self, options: ResourceOptions<Vec<Category>>) -> CachedResource<Vec<Category>> {
        let backend = Arc::clone(&self.backend);
        let fetch = fetcher(move || {
            let backend = Arc::clone(&backend);
            async move {
                let mut rows = backend
                    .fetch_categories()
                    .await
                    .context("Failed to fetch categories")?;
                rows.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(rows)
            }
        });
        self.build(CATEGORIES_KEY.to_string(), fetch, options, CATEGORIES_TTL)
    }

    /// Products of one branch. An empty branch id mounts the resource
    /// disabled.
    pub async fn products(
        &self,
        branch_id: &str,
        options: ResourceOptions<Vec<Product>>,
    ) -> CachedResource<Vec<Product>> {
        self.products_resource(branch_id, options).start().await
    }

    pub fn products_resource(
        &self,
        branch_id: &str,
        options: ResourceOptions<Vec<Product>>,
    ) -> CachedResource<Vec<Product>> {
        let options = if branch_id.is_empty() {
            options.enabled(false)
        } else {
            options
        };
        self.build(
            products_key(branch_id),
            self.products_fetcher(branch_id),
            options,
            PRODUCTS_TTL,
        )
    }

    /// Point a products resource at another branch. Switching to the empty
    /// branch id disables the resource before retargeting, so nothing is
    /// fetched for it.
    pub async fn switch_branch(&self, resource: &CachedResource<Vec<Product>>, branch_id: &str) {
        if branch_id.is_empty() {
            resource.set_enabled(false).await;
        }
        resource
            .retarget(products_key(branch_id), self.products_fetcher(branch_id))
            .await;
        if !branch_id.is_empty() {
            resource.set_enabled(true).await;
        }
    }

    pub fn products_fetcher(&self, branch_id: &str) -> Fetcher<Vec<Product>> {
        let backend = Arc::clone(&self.backend);
        let branch_id = branch_id.to_string();
        fetcher(move || {
            let backend = Arc::clone(&backend);
            let branch_id = branch_id.clone();
            async move {
                let rows = backend
                    .fetch_products(&branch_id)
                    .await
                    .with_context(|| format!("Failed to fetch products for branch {}", branch_id))?;
                Ok(filter_products(rows, &branch_id))
            }
        })
    }

    /// Active employees, of one branch or of all of them.
    pub async fn employees(
        &self,
        branch_id: Option<&str>,
        options: ResourceOptions<Vec<Employee>>,
    ) -> CachedResource<Vec<Employee>> {
        self.employees_resource(branch_id, options).start().await
    }

    pub fn employees_resource(
        &self,
        branch_id: Option<&str>,
        options: ResourceOptions<Vec<Employee>>,
    ) -> CachedResource<Vec<Employee>> {
        let backend = Arc::clone(&self.backend);
        let branch = branch_id.map(str::to_string);
        let fetch = fetcher(move || {
            let backend = Arc::clone(&backend);
            let branch = branch.clone();
            async move {
                let rows = backend
                    .fetch_employees(branch.as_deref())
                    .await
                    .context("Failed to fetch employees")?;
                Ok(filter_employees(rows))
            }
        });
        self.build(employees_key(branch_id), fetch, options, EMPLOYEES_TTL)
    }

    pub async fn customers(&self, options: ResourceOptions<Vec<Customer>>) -> CachedResource<Vec<Customer>> {
        self.customers_resource(options).start().await
    }

    pub fn customers_resource(&self, options: ResourceOptions<Vec<Customer>>) -> CachedResource<Vec<Customer>> {
        let backend = Arc::clone(&self.backend);
        let fetch = fetcher(move || {
            let backend = Arc::clone(&backend);
            async move {
                let mut rows = backend
                    .fetch_customers()
                    .await
                    .context("Failed to fetch customers")?;
                rows.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(rows)
            }
        });
        self.build(CUSTOMERS_KEY.to_string(), fetch, options, CUSTOMERS_TTL)
    }

    fn build<T: Cacheable>(
        &self,
        key: String,
        fetch: Fetcher<T>,
        options: ResourceOptions<T>,
        default_ttl: Duration,
    ) -> CachedResource<T> {
        let options = if options.ttl.is_none() {
            options.with_ttl(default_ttl)
        } else {
            options
        };
        CachedResource::new(self.manager.clone(), key, fetch, options)
    }
}

fn sort_branches(mut rows: Vec<Branch>) -> Vec<Branch> {
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// Active products of `branch_id`, by name.
fn filter_products(rows: Vec<Product>, branch_id: &str) -> Vec<Product> {
    let mut rows: Vec<Product> = rows
        .into_iter()
        .filter(|p| p.is_active && p.branch_id.as_deref().map_or(true, |b| b == branch_id))
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

fn filter_employees(rows: Vec<Employee>) -> Vec<Employee> {
    let mut rows: Vec<Employee> = rows.into_iter().filter(|e| e.is_active).collect();
    rows.sort_by_key(|e| e.full_name());
    rows
}
