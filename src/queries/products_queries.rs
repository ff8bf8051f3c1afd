use std::collections::HashMap;

use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        Category, CategoryCount, Product, ProductQuery, ProductResponse, ProductSearchResponse,
        SortBy,
    },
    queries::page,
};

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(product)
}

pub async fn find_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;

    Ok(products.into_iter().map(|p| (p.id, p)).collect())
}

pub async fn search_products(pool: &PgPool, params: ProductQuery) -> Result<ProductSearchResponse> {
    let (limit, offset) = page(params.limit, params.offset);

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT *, COUNT(*) OVER() AS total_count FROM products WHERE 1=1");

    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q);
        query.push(" AND (title ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR description ILIKE ");
        query.push_bind(pattern);
        query.push(")");
    }

    if let Some(category) = params.category {
        query.push(" AND category = ");
        query.push_bind(category);
    }

    if let Some(status) = params.status {
        query.push(" AND status = ");
        query.push_bind(status);
    }

    if let Some(ref collection) = params.collection {
        query.push(" AND collection = ");
        query.push_bind(collection.clone());
    }

    query.push(" ORDER BY ");
    match params.sort {
        Some(SortBy::PriceAsc) => query.push("price ASC, created_at DESC"),
        Some(SortBy::PriceDesc) => query.push("price DESC, created_at DESC"),
        Some(SortBy::Newest) | None => query.push("created_at DESC"),
    };

    query.push(" LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    #[derive(sqlx::FromRow)]
    struct SearchResult {
        #[sqlx(flatten)]
        product: Product,
        total_count: i64,
    }

    let results = query
        .build_query_as::<SearchResult>()
        .fetch_all(pool)
        .await?;

    let total = results.first().map(|r| r.total_count).unwrap_or(0);
    let products = results
        .into_iter()
        .map(|r| ProductResponse::from(r.product))
        .collect();

    Ok(ProductSearchResponse {
        products,
        total,
        limit,
        offset,
    })
}

/// Every category, including the empty ones.
pub async fn category_counts(pool: &PgPool) -> Result<Vec<CategoryCount>> {
    let rows = sqlx::query_as::<_, CategoryCount>(
        "SELECT category, COUNT(*)::bigint AS count FROM products GROUP BY category",
    )
    .fetch_all(pool)
    .await?;

    let counts: HashMap<Category, i64> = rows.into_iter().map(|r| (r.category, r.count)).collect();

    Ok(Category::ALL
        .into_iter()
        .map(|category| CategoryCount {
            category,
            count: counts.get(&category).copied().unwrap_or(0),
        })
        .collect())
}

pub async fn create_product(pool: &PgPool, product: &Product) -> Result<Product> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (
            id, title, description, category, collection, price, cost, stock_quantity,
            track_quantity, continue_selling, has_sku, sku, images, variants, status,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(product.id)
    .bind(&product.title)
    .bind(&product.description)
    .bind(product.category)
    .bind(&product.collection)
    .bind(product.price)
    .bind(product.cost)
    .bind(product.stock_quantity)
    .bind(product.track_quantity)
    .bind(product.continue_selling)
    .bind(product.has_sku)
    .bind(&product.sku)
    .bind(&product.images)
    .bind(&product.variants)
    .bind(product.status)
    .fetch_one(pool)
    .await?;

    Ok(product)
}

pub async fn update_product(pool: &PgPool, product: &Product) -> Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET
            title = $2,
            description = $3,
            category = $4,
            collection = $5,
            price = $6,
            cost = $7,
            stock_quantity = $8,
            track_quantity = $9,
            continue_selling = $10,
            has_sku = $11,
            sku = $12,
            images = $13,
            variants = $14,
            status = $15,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(product.id)
    .bind(&product.title)
    .bind(&product.description)
    .bind(product.category)
    .bind(&product.collection)
    .bind(product.price)
    .bind(product.cost)
    .bind(product.stock_quantity)
    .bind(product.track_quantity)
    .bind(product.continue_selling)
    .bind(product.has_sku)
    .bind(&product.sku)
    .bind(&product.images)
    .bind(&product.variants)
    .bind(product.status)
    .fetch_optional(pool)
    .await?;

    Ok(product)
}

pub async fn delete_product(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
