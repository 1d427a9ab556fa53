use std::sync::Arc;

use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::Deserialize;
use tracing::instrument;

use crate::{
    entities::{brand, category, product, Brand, Category, Product, ProductModel},
    errors::ServiceError,
};

/// Read side of the storefront catalog. Only active products are visible;
/// inactive ones stay reachable through existing order lines but never
/// through these queries.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub q: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let mut condition = Condition::all().add(product::Column::IsActive.eq(true));

        if let Some(slug) = &filter.category {
            let cat = Category::find()
                .filter(category::Column::Slug.eq(slug))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Category {slug} not found")))?;
            condition = condition.add(product::Column::CategoryId.eq(cat.id));
        }
        if let Some(slug) = &filter.brand {
            let brand = Brand::find()
                .filter(brand::Column::Slug.eq(slug))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Brand {slug} not found")))?;
            condition = condition.add(product::Column::BrandId.eq(brand.id));
        }
        if let Some(term) = filter.q.as_deref().filter(|t| !t.trim().is_empty()) {
            condition = condition.add(product::Column::Name.contains(term.trim()));
        }

        let per_page = filter.per_page.unwrap_or(24).clamp(1, 100);
        let page = filter.page.unwrap_or(1).max(1);

        let paginator = Product::find()
            .filter(condition)
            .order_by_asc(product::Column::Name)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page - 1).await?;
        Ok((data, total))
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, slug: &str) -> Result<ProductModel, ServiceError> {
        Product::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {slug} not found")))
    }

    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn list_brands(&self) -> Result<Vec<brand::Model>, ServiceError> {
        Ok(Brand::find()
            .order_by_asc(brand::Column::Name)
            .all(&*self.db)
            .await?)
    }
}
