use sqlx::PgPool;

use crate::{
    error::Result,
    models::{
        DashboardStats, Order, OrderQuery, OrderSearchResponse, OrderStatusCount, ProductStats,
        RevenueByCurrency,
    },
    queries::{order_queries, page},
};

/// Tracked products at or below this many units count as low stock.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

pub async fn dashboard_stats(pool: &PgPool) -> Result<DashboardStats> {
    let products = sqlx::query_as::<_, ProductStats>(
        r#"
        SELECT
            COUNT(*)::bigint AS total,
            COUNT(*) FILTER (WHERE status = 'draft')::bigint AS draft,
            COUNT(*) FILTER (WHERE status = 'active')::bigint AS active,
            COUNT(*) FILTER (WHERE status = 'archived')::bigint AS archived,
            COUNT(*) FILTER (
                WHERE track_quantity AND status = 'active' AND stock_quantity <= $1
            )::bigint AS low_stock
        FROM products
        "#,
    )
    .bind(LOW_STOCK_THRESHOLD)
    .fetch_one(pool)
    .await?;

    let orders = sqlx::query_as::<_, OrderStatusCount>(
        "SELECT status, COUNT(*)::bigint AS count FROM orders GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    let revenue = sqlx::query_as::<_, RevenueByCurrency>(
        "SELECT currency, COALESCE(SUM(amount), 0)::bigint AS amount
         FROM orders
         WHERE status IN ('paid', 'processing', 'shipped', 'delivered')
         GROUP BY currency
         ORDER BY currency",
    )
    .fetch_all(pool)
    .await?;

    let customers: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::bigint FROM user_profiles WHERE role != 'admin'",
    )
    .fetch_one(pool)
    .await?;

    Ok(DashboardStats {
        products,
        orders,
        revenue,
        customers,
    })
}

pub async fn get_orders(pool: &PgPool, params: OrderQuery) -> Result<OrderSearchResponse> {
    let (limit, offset) = page(params.limit, params.offset);

    let mut query_builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
        "SELECT *, COUNT(*) OVER() AS total_count FROM orders WHERE 1=1",
    );

    if let Some(ref user_uid) = params.user_uid {
        query_builder.push(" AND user_uid = ");
        query_builder.push_bind(user_uid.clone());
    }

    if let Some(status) = params.status {
        query_builder.push(" AND status = ");
        query_builder.push_bind(status);
    }

    query_builder.push(" ORDER BY created_at DESC");
    query_builder.push(" LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    #[derive(sqlx::FromRow)]
    struct SearchResult {
        #[sqlx(flatten)]
        order: Order,
        total_count: i64,
    }

    let results = query_builder
        .build_query_as::<SearchResult>()
        .fetch_all(pool)
        .await?;

    let total = results.first().map(|r| r.total_count).unwrap_or(0);
    let orders: Vec<Order> = results.into_iter().map(|r| r.order).collect();
    let orders = order_queries::with_items(pool, orders).await?;

    Ok(OrderSearchResponse {
        orders,
        total,
        limit,
        offset,
    })
}
