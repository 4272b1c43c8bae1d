//! Product repository over `products.json`.

use chrono::Utc;

use tienda_core::ProductId;

use super::{RepositoryError, Store};
use crate::models::{Product, ProductInput};

/// Repository for product catalog operations.
pub struct ProductRepository<'a> {
    store: &'a Store,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// All products in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `products.json` cannot be read.
    pub async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let mut products = self.store.products().load().await?;
        sort_for_display(&mut products);
        Ok(products)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `products.json` cannot be read.
    pub async fn get(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.store.products().load().await?;
        Ok(products.into_iter().find(|p| &p.id == id))
    }

    /// Create a product at the end of the catalog.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the file cannot be read or written.
    pub async fn create(&self, input: ProductInput) -> Result<Product, RepositoryError> {
        let mut products = self.store.products().lock().await?;
        let position = products
            .iter()
            .map(|p| p.position + 1)
            .max()
            .unwrap_or_default();
        let product = Product::new(input, position);
        products.push(product.clone());
        products.commit().await?;
        Ok(product)
    }

    /// Overwrite a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no product has this ID.
    pub async fn update(
        &self,
        id: &ProductId,
        input: ProductInput,
    ) -> Result<Product, RepositoryError> {
        let mut products = self.store.products().lock().await?;
        let product = products
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or(RepositoryError::NotFound)?;
        product.apply(input);
        let updated = product.clone();
        products.commit().await?;
        Ok(updated)
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no product has this ID.
    pub async fn delete(&self, id: &ProductId) -> Result<(), RepositoryError> {
        if self.delete_many(std::slice::from_ref(id)).await? == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete every listed product. Unknown IDs are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the file cannot be read or written.
    pub async fn delete_many(&self, ids: &[ProductId]) -> Result<usize, RepositoryError> {
        let mut products = self.store.products().lock().await?;
        let before = products.len();
        products.retain(|p| !ids.contains(&p.id));
        let removed = before - products.len();
        if removed > 0 {
            products.commit().await?;
        }
        Ok(removed)
    }

    /// Show or hide every listed product in the storefront.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the file cannot be read or written.
    pub async fn set_active_many(
        &self,
        ids: &[ProductId],
        active: bool,
    ) -> Result<usize, RepositoryError> {
        let mut products = self.store.products().lock().await?;
        let now = Utc::now();
        let mut changed = 0;
        for product in products.iter_mut().filter(|p| ids.contains(&p.id)) {
            if product.active != active {
                product.active = active;
                product.updated_at = now;
                changed += 1;
            }
        }
        if changed > 0 {
            products.commit().await?;
        }
        Ok(changed)
    }

    /// Apply a drag-and-drop order.
    ///
    /// Listed products take positions `0..n` in the given order; products
    /// missing from the list keep their relative order after them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if an ID is unknown or repeated.
    pub async fn reorder(&self, ids: &[ProductId]) -> Result<(), RepositoryError> {
        let mut products = self.store.products().lock().await?;

        for (index, id) in ids.iter().enumerate() {
            if ids[..index].contains(id) {
                return Err(RepositoryError::Conflict(format!("duplicate product {id}")));
            }
            if !products.iter().any(|p| &p.id == id) {
                return Err(RepositoryError::Conflict(format!("unknown product {id}")));
            }
        }

        sort_for_display(&mut products);
        let rest: Vec<ProductId> = products
            .iter()
            .filter(|p| !ids.contains(&p.id))
            .map(|p| p.id.clone())
            .collect();

        for (position, id) in ids.iter().chain(rest.iter()).enumerate() {
            if let Some(product) = products.iter_mut().find(|p| &p.id == id) {
                product.position = u32::try_from(position).unwrap_or(u32::MAX);
            }
        }
        sort_for_display(&mut products);
        products.commit().await
    }

    /// Add `delta` units to a product's stock and return the new product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no product has this ID.
    pub async fn adjust_stock(
        &self,
        id: &ProductId,
        delta: i64,
    ) -> Result<Product, RepositoryError> {
        let mut products = self.store.products().lock().await?;
        let product = products
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or(RepositoryError::NotFound)?;
        product.stock = product.stock.saturating_add(delta);
        product.updated_at = Utc::now();
        let updated = product.clone();
        products.commit().await?;
        Ok(updated)
    }

    /// Active products at or below `threshold` units, lowest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `products.json` cannot be read.
    pub async fn low_stock(&self, threshold: i64) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self
            .store
            .products()
            .load()
            .await?
            .into_iter()
            .filter(|p| p.active && p.stock <= threshold)
            .collect();
        products.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
        Ok(products)
    }
}

fn sort_for_display(products: &mut [Product]) {
    products.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tienda_core::Price;

    fn input(name: &str, stock: i64) -> ProductInput {
        ProductInput {
            name: name.to_owned(),
            description: String::new(),
            price: Price::from_cents(250_000),
            compare_at_price: None,
            stock,
            category: "mates".to_owned(),
            image_url: None,
            active: true,
            featured: false,
        }
    }

    async fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_appends_position() {
        let (_dir, store) = store().await;
        let repo = ProductRepository::new(&store);

        let a = repo.create(input("Mate", 3)).await.unwrap();
        let b = repo.create(input("Bombilla", 10)).await.unwrap();

        assert_eq!(a.position, 0);
        assert_eq!(b.position, 1);
        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Mate", "Bombilla"]);
    }

    #[tokio::test]
    async fn test_reorder_moves_listed_first() {
        let (_dir, store) = store().await;
        let repo = ProductRepository::new(&store);
        let a = repo.create(input("A", 1)).await.unwrap();
        let b = repo.create(input("B", 1)).await.unwrap();
        let c = repo.create(input("C", 1)).await.unwrap();

        repo.reorder(&[c.id.clone(), a.id.clone()]).await.unwrap();

        let ids: Vec<_> = repo.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
    }

    #[tokio::test]
    async fn test_reorder_rejects_unknown_and_duplicate_ids() {
        let (_dir, store) = store().await;
        let repo = ProductRepository::new(&store);
        let a = repo.create(input("A", 1)).await.unwrap();

        assert!(matches!(
            repo.reorder(&[ProductId::new("prod_missing")]).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(matches!(
            repo.reorder(&[a.id.clone(), a.id]).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_bulk_delete_and_visibility() {
        let (_dir, store) = store().await;
        let repo = ProductRepository::new(&store);
        let a = repo.create(input("A", 1)).await.unwrap();
        let b = repo.create(input("B", 1)).await.unwrap();

        let hidden = repo
            .set_active_many(&[a.id.clone(), b.id.clone()], false)
            .await
            .unwrap();
        assert_eq!(hidden, 2);
        assert_eq!(repo.set_active_many(&[a.id.clone()], false).await.unwrap(), 0);

        assert_eq!(repo.delete_many(&[a.id.clone()]).await.unwrap(), 1);
        assert!(repo.get(&a.id).await.unwrap().is_none());
        assert!(matches!(repo.delete(&a.id).await, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_low_stock_skips_inactive() {
        let (_dir, store) = store().await;
        let repo = ProductRepository::new(&store);
        repo.create(input("Poco", 2)).await.unwrap();
        repo.create(input("Mucho", 40)).await.unwrap();
        let hidden = repo.create(input("Oculto", 0)).await.unwrap();
        repo.set_active_many(&[hidden.id], false).await.unwrap();

        let low = repo.low_stock(5).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Poco");
    }

    #[tokio::test]
    async fn test_adjust_stock() {
        let (_dir, store) = store().await;
        let repo = ProductRepository::new(&store);
        let a = repo.create(input("A", 2)).await.unwrap();

        assert_eq!(repo.adjust_stock(&a.id, -5).await.unwrap().stock, -3);
        assert_eq!(repo.adjust_stock(&a.id, 10).await.unwrap().stock, 7);
    }
}
