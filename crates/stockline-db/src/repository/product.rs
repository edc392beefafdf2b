//! # Product Repository
//!
//! Read access to the product catalog, plus inserts for seeding and tests.
//!
//! ## Identifier Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Uploaded identifiers: ["COKE-330", "5449000000996", "7f3c...-uuid"]    │
//! │       │                                                                 │
//! │       ▼  one query, identifiers bound as a JSON array                  │
//! │  WHERE is_active = 1 AND (sku IN json_each(?1)                         │
//! │                        OR barcode IN json_each(?1)                     │
//! │                        OR id IN json_each(?1))                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller resolves each identifier: sku first, then barcode, then id     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockline_core::Product;

const PRODUCT_COLUMNS: &str = "id, sku, barcode, name, category_id, is_active, created_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID, active or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets an active product by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE sku = ?1 AND is_active = 1",
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Active products matching any identifier by SKU, barcode or id.
    ///
    /// A single query regardless of how many identifiers are passed.
    pub async fn find_by_identifiers(&self, identifiers: &[String]) -> DbResult<Vec<Product>> {
        if identifiers.is_empty() {
            return Ok(Vec::new());
        }

        let ids = serde_json::to_string(identifiers)
            .map_err(|e| DbError::Internal(format!("encode identifiers: {}", e)))?;

        let sql = format!(
            r#"
            SELECT {}
            FROM products
            WHERE is_active = 1
            AND (
                sku IN (SELECT value FROM json_each(?1))
                OR barcode IN (SELECT value FROM json_each(?1))
                OR id IN (SELECT value FROM json_each(?1))
            )
            "#,
            PRODUCT_COLUMNS
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            requested = identifiers.len(),
            found = products.len(),
            "Resolved product identifiers"
        );
        Ok(products)
    }

    /// Active products in a reconciliation scope.
    ///
    /// `None` selects every active product (general scope).
    pub async fn list_active_in_category(
        &self,
        category_id: Option<&str>,
    ) -> DbResult<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM products
            WHERE is_active = 1
            AND (?1 IS NULL OR category_id = ?1)
            ORDER BY sku
            "#,
            PRODUCT_COLUMNS
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Inserts a product. The catalog owns products; this exists for seeding.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, sku, barcode, name, category_id, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.category_id)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.sku),
            other => other,
        })?;

        Ok(())
    }

    /// Creates and inserts an active product with a generated id.
    pub async fn create(
        &self,
        sku: &str,
        barcode: Option<&str>,
        name: &str,
        category_id: Option<&str>,
    ) -> DbResult<Product> {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            barcode: barcode.map(str::to_string),
            name: name.to_string(),
            category_id: category_id.map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
        };

        self.insert(&product).await?;
        Ok(product)
    }

    /// Soft-deletes or reactivates a product.
    pub async fn set_active(&self, id: &str, is_active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_find_by_identifiers_matches_sku_barcode_and_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let coke = repo
            .create("COKE-330", Some("5449000000996"), "Coca-Cola 330ml", Some("drinks"))
            .await
            .unwrap();
        let chips = repo.create("CHIPS-01", None, "Chips", Some("snacks")).await.unwrap();
        let gone = repo.create("OLD-01", None, "Retired", None).await.unwrap();
        repo.set_active(&gone.id, false).await.unwrap();

        let found = repo
            .find_by_identifiers(&[
                "5449000000996".to_string(),
                chips.id.clone(),
                "OLD-01".to_string(),
                "NOPE".to_string(),
            ])
            .await
            .unwrap();

        let mut skus: Vec<_> = found.iter().map(|p| p.sku.as_str()).collect();
        skus.sort();
        assert_eq!(skus, vec!["CHIPS-01", "COKE-330"]);
        assert!(found.iter().any(|p| p.id == coke.id));
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.create("SKU-1", None, "One", None).await.unwrap();
        let err = repo.create("SKU-1", None, "Again", None).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_list_active_in_category() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.create("A-1", None, "A1", Some("A")).await.unwrap();
        repo.create("A-2", None, "A2", Some("A")).await.unwrap();
        repo.create("B-1", None, "B1", Some("B")).await.unwrap();

        assert_eq!(repo.list_active_in_category(Some("A")).await.unwrap().len(), 2);
        assert_eq!(repo.list_active_in_category(None).await.unwrap().len(), 3);
        assert!(repo.list_active_in_category(Some("Z")).await.unwrap().is_empty());
    }
}
