use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::types::Json as DbJson;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        CategoryCount, Product, ProductQuery, ProductRequest, ProductResponse,
        ProductSearchResponse, ProductStatus, Variant,
    },
    queries::products_queries,
    AppState,
};

const MAX_TITLE_LEN: usize = 200;
const MAX_IMAGES: usize = 10;

/// Largest value a `NUMERIC(12, 2)` price or cost column holds.
fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductQuery>,
) -> Result<Json<ProductSearchResponse>> {
    let products = products_queries::search_products(&state.db, params).await?;

    Ok(Json(products))
}

pub async fn get_categories(State(state): State<AppState>) -> Result<Json<Vec<CategoryCount>>> {
    let counts = products_queries::category_counts(&state.db).await?;

    Ok(Json(counts))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductResponse>> {
    let product = products_queries::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    Ok(Json(ProductResponse::from(product)))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>)> {
    let product = new_product(payload)?;
    validate_product(&product)?;

    let product = products_queries::create_product(&state.db, &product).await?;
    tracing::info!("Product {} created: {}", product.id, product.title);

    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<ProductResponse>> {
    let mut product = products_queries::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product with id {} not found", id)))?;

    apply_update(&mut product, payload);
    validate_product(&product)?;

    let product = products_queries::update_product(&state.db, &product)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product with id {} not found", id)))?;

    Ok(Json(ProductResponse::from(product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if products_queries::delete_product(&state.db, id).await? == 0 {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    tracing::info!("Product {} deleted", id);

    Ok(StatusCode::NO_CONTENT)
}

fn new_product(req: ProductRequest) -> Result<Product> {
    let title = req
        .title
        .ok_or_else(|| AppError::BadRequest("title is required".to_string()))?;
    let category = req
        .category
        .ok_or_else(|| AppError::BadRequest("category is required".to_string()))?;
    let price = req
        .price
        .ok_or_else(|| AppError::BadRequest("price is required".to_string()))?;

    let now = Utc::now();
    let has_sku = req.has_sku.unwrap_or(false);

    Ok(Product {
        id: Uuid::new_v4(),
        title: title.trim().to_string(),
        description: req.description.unwrap_or_default(),
        category,
        collection: non_empty(req.collection),
        price,
        cost: req.cost.unwrap_or(Decimal::ZERO),
        stock_quantity: req.stock_quantity.unwrap_or(0),
        track_quantity: req.track_quantity.unwrap_or(true),
        continue_selling: req.continue_selling.unwrap_or(false),
        has_sku,
        sku: if has_sku { non_empty(req.sku) } else { None },
        images: DbJson(req.images.unwrap_or_default()),
        variants: DbJson(req.variants.unwrap_or_default()),
        status: req.status.unwrap_or(ProductStatus::Draft),
        created_at: now,
        updated_at: now,
    })
}

fn apply_update(product: &mut Product, req: ProductRequest) {
    if let Some(title) = req.title {
        product.title = title.trim().to_string();
    }
    if let Some(description) = req.description {
        product.description = description;
    }
    if let Some(category) = req.category {
        product.category = category;
    }
    if req.collection.is_some() {
        product.collection = non_empty(req.collection);
    }
    if let Some(price) = req.price {
        product.price = price;
    }
    if let Some(cost) = req.cost {
        product.cost = cost;
    }
    if let Some(stock_quantity) = req.stock_quantity {
        product.stock_quantity = stock_quantity;
    }
    if let Some(track_quantity) = req.track_quantity {
        product.track_quantity = track_quantity;
    }
    if let Some(continue_selling) = req.continue_selling {
        product.continue_selling = continue_selling;
    }
    if let Some(has_sku) = req.has_sku {
        product.has_sku = has_sku;
    }
    if req.sku.is_some() {
        product.sku = non_empty(req.sku);
    }
    if !product.has_sku {
        product.sku = None;
    }
    if let Some(images) = req.images {
        product.images = DbJson(images);
    }
    if let Some(variants) = req.variants {
        product.variants = DbJson(variants);
    }
    if let Some(status) = req.status {
        product.status = status;
    }
}

fn validate_product(product: &Product) -> Result<()> {
    if product.title.is_empty() {
        return Err(AppError::BadRequest("Title cannot be empty".to_string()));
    }

    if product.title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::BadRequest(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }

    if product.price.is_sign_negative() {
        return Err(AppError::BadRequest("Price cannot be negative".to_string()));
    }

    if product.cost.is_sign_negative() {
        return Err(AppError::BadRequest("Cost cannot be negative".to_string()));
    }

    if product.price > max_amount() || product.cost > max_amount() {
        return Err(AppError::BadRequest(format!(
            "Price and cost must be at most {}",
            max_amount()
        )));
    }

    if product.stock_quantity < 0 {
        return Err(AppError::BadRequest(
            "Stock quantity cannot be negative".to_string(),
        ));
    }

    if product.has_sku && product.sku.is_none() {
        return Err(AppError::BadRequest(
            "SKU is required when has_sku is set".to_string(),
        ));
    }

    if product.images.len() > MAX_IMAGES {
        return Err(AppError::BadRequest(format!(
            "A product can have at most {} images",
            MAX_IMAGES
        )));
    }

    for image in product.images.iter() {
        validate_image(image)?;
    }

    validate_variants(&product.variants)
}

/// Accepts `http(s)` URLs and embedded `data:image/...;base64,` images.
fn validate_image(image: &str) -> Result<()> {
    let is_url = image.starts_with("https://") || image.starts_with("http://");

    let is_data = image
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(mime, payload)| !mime.is_empty() && !payload.is_empty())
        .unwrap_or(false);

    if !is_url && !is_data {
        return Err(AppError::BadRequest(
            "Images must be http(s) URLs or base64 data URLs".to_string(),
        ));
    }

    Ok(())
}

fn validate_variants(variants: &[Variant]) -> Result<()> {
    let mut names = HashSet::new();

    for variant in variants {
        let name = variant.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Variant name cannot be empty".to_string()));
        }

        if !names.insert(name.to_lowercase()) {
            return Err(AppError::BadRequest(format!("Duplicate variant: {}", name)));
        }

        if variant.values.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Variant {} needs at least one value",
                name
            )));
        }

        let mut values = HashSet::new();
        for value in &variant.values {
            let value = value.trim();
            if value.is_empty() || !values.insert(value) {
                return Err(AppError::BadRequest(format!(
                    "Variant {} has an empty or duplicate value",
                    name
                )));
            }
        }
    }

    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn request() -> ProductRequest {
        ProductRequest {
            title: Some("  Kantha Throw  ".to_string()),
            category: Some(Category::Living),
            price: Some("2499".parse().unwrap()),
            cost: Some("1500".parse().unwrap()),
            stock_quantity: Some(4),
            images: Some(vec!["https://cdn.example.com/kantha.jpg".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_product_defaults() {
        let product = new_product(request()).unwrap();

        assert_eq!(product.title, "Kantha Throw");
        assert_eq!(product.status, ProductStatus::Draft);
        assert!(product.track_quantity);
        assert!(!product.continue_selling);
        assert!(product.variants.is_empty());
        assert!(validate_product(&product).is_ok());
    }

    #[test]
    fn test_required_fields() {
        let missing_price = ProductRequest {
            price: None,
            ..request()
        };
        assert!(matches!(
            new_product(missing_price),
            Err(AppError::BadRequest(msg)) if msg.contains("price")
        ));

        let missing_category = ProductRequest {
            category: None,
            ..request()
        };
        assert!(new_product(missing_category).is_err());
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut product = new_product(request()).unwrap();
        product.price = "-1".parse().unwrap();
        assert!(validate_product(&product).is_err());

        let mut product = new_product(request()).unwrap();
        product.cost = "-0.01".parse().unwrap();
        assert!(validate_product(&product).is_err());

        let mut product = new_product(request()).unwrap();
        product.stock_quantity = -1;
        assert!(validate_product(&product).is_err());
    }

    #[test]
    fn test_amounts_bounded_by_column_precision() {
        let mut product = new_product(request()).unwrap();
        product.price = "9999999999.99".parse().unwrap();
        assert!(validate_product(&product).is_ok());

        product.price = "1000000000000".parse().unwrap();
        assert!(matches!(
            validate_product(&product),
            Err(AppError::BadRequest(_))
        ));

        let mut product = new_product(request()).unwrap();
        product.cost = "10000000000".parse().unwrap();
        assert!(validate_product(&product).is_err());
    }

    #[test]
    fn test_sku_without_flag_dropped_on_create() {
        let product = new_product(ProductRequest {
            has_sku: Some(false),
            sku: Some("KT-001".to_string()),
            ..request()
        })
        .unwrap();
        assert!(product.sku.is_none());

        let product = new_product(ProductRequest {
            sku: Some("KT-001".to_string()),
            ..request()
        })
        .unwrap();
        assert!(product.sku.is_none());
    }

    #[test]
    fn test_sku_required_when_flagged() {
        let product = new_product(ProductRequest {
            has_sku: Some(true),
            ..request()
        })
        .unwrap();
        assert!(validate_product(&product).is_err());

        let product = new_product(ProductRequest {
            has_sku: Some(true),
            sku: Some("KT-001".to_string()),
            ..request()
        })
        .unwrap();
        assert!(validate_product(&product).is_ok());
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut product = new_product(request()).unwrap();

        apply_update(
            &mut product,
            ProductRequest {
                price: Some("1999".parse().unwrap()),
                status: Some(ProductStatus::Active),
                ..Default::default()
            },
        );

        assert_eq!(product.title, "Kantha Throw");
        assert_eq!(product.price, "1999".parse::<Decimal>().unwrap());
        assert_eq!(product.cost, "1500".parse::<Decimal>().unwrap());
        assert_eq!(product.status, ProductStatus::Active);
        assert_eq!(product.images.len(), 1);
    }

    #[test]
    fn test_clearing_sku_flag_drops_sku() {
        let mut product = new_product(ProductRequest {
            has_sku: Some(true),
            sku: Some("KT-001".to_string()),
            ..request()
        })
        .unwrap();

        apply_update(
            &mut product,
            ProductRequest {
                has_sku: Some(false),
                ..Default::default()
            },
        );

        assert!(product.sku.is_none());
    }

    #[test]
    fn test_image_formats() {
        assert!(validate_image("https://cdn.example.com/a.png").is_ok());
        assert!(validate_image("data:image/png;base64,iVBORw0KGgo=").is_ok());
        assert!(validate_image("data:image/png;base64,").is_err());
        assert!(validate_image("data:text/html;base64,PGgxPg==").is_err());
        assert!(validate_image("ftp://example.com/a.png").is_err());
    }

    #[test]
    fn test_variant_rules() {
        let ok = vec![
            Variant {
                name: "Size".to_string(),
                values: vec!["S".to_string(), "M".to_string()],
            },
            Variant {
                name: "Colour".to_string(),
                values: vec!["Indigo".to_string()],
            },
        ];
        assert!(validate_variants(&ok).is_ok());

        let duplicate_name = vec![ok[0].clone(), ok[0].clone()];
        assert!(validate_variants(&duplicate_name).is_err());

        let duplicate_value = vec![Variant {
            name: "Size".to_string(),
            values: vec!["S".to_string(), " S ".to_string()],
        }];
        assert!(validate_variants(&duplicate_value).is_err());

        let no_values = vec![Variant {
            name: "Size".to_string(),
            values: Vec::new(),
        }];
        assert!(validate_variants(&no_values).is_err());
    }
}
