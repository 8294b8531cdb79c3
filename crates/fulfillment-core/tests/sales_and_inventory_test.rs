// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coverage of C4/C5: atomic decrement on sale, idempotent replay, and the
//! low-stock hook opening a restock task.

mod common;

use rust_decimal::Decimal;

use fulfillment_core::sales::RecordSaleInput;
use fulfillment_core::types::{AutomationTaskStatus, SaleChannel};

use common::TestContext;

#[tokio::test]
async fn recording_a_sale_decrements_stock() {
    let ctx = TestContext::new().await;
    ctx.inventory
        .create_item(1001, "Widget".to_string(), 50, 10)
        .await
        .expect("create inventory item");

    let sale = ctx
        .sales
        .record_sale(
            RecordSaleInput {
                product_id: 1001,
                quantity: 5,
                unit_price: Decimal::new(1999, 2),
                sold_by: 7,
                sale_channel: SaleChannel::Store,
                related_order_id: None,
                idempotency_key: None,
            },
            None,
        )
        .await
        .expect("record sale");

    assert_eq!(sale.quantity, 5);

    let item = ctx
        .inventory
        .list_low_stock(100)
        .await
        .expect("list low stock");
    assert!(item.is_empty(), "45 units remaining should be above the threshold of 10");
}

#[tokio::test]
async fn an_idempotency_key_replay_returns_the_same_sale_without_a_second_decrement() {
    let ctx = TestContext::new().await;
    ctx.inventory
        .create_item(1002, "Gadget".to_string(), 20, 5)
        .await
        .expect("create inventory item");

    let input = || RecordSaleInput {
        product_id: 1002,
        quantity: 3,
        unit_price: Decimal::new(500, 2),
        sold_by: 7,
        sale_channel: SaleChannel::Online,
        related_order_id: None,
        idempotency_key: Some("replay-key-1".to_string()),
    };

    let first = ctx.sales.record_sale(input(), None).await.expect("first record");
    let second = ctx.sales.record_sale(input(), None).await.expect("replayed record");

    assert_eq!(first.id, second.id, "replay must return the original sale, not a new one");
}

#[tokio::test]
async fn a_sale_exceeding_stock_fails_and_leaves_no_partial_state() {
    let ctx = TestContext::new().await;
    ctx.inventory
        .create_item(1003, "Scarce Thing".to_string(), 2, 1)
        .await
        .expect("create inventory item");

    let result = ctx
        .sales
        .record_sale(
            RecordSaleInput {
                product_id: 1003,
                quantity: 10,
                unit_price: Decimal::new(100, 2),
                sold_by: 7,
                sale_channel: SaleChannel::Wholesale,
                related_order_id: None,
                idempotency_key: None,
            },
            None,
        )
        .await;

    assert!(result.is_err(), "insufficient stock must be rejected");

    let summary = ctx.sales.summary(None).await.expect("sales summary");
    assert_eq!(summary.count, 0, "the compensated sale row must not be observable");
}

#[tokio::test]
async fn stock_at_or_below_threshold_opens_a_restock_task() {
    let ctx = TestContext::new().await;
    ctx.inventory
        .create_item(1004, "Low Stock Item".to_string(), 10, 10)
        .await
        .expect("create inventory item");

    ctx.sales
        .record_sale(
            RecordSaleInput {
                product_id: 1004,
                quantity: 1,
                unit_price: Decimal::new(100, 2),
                sold_by: 7,
                sale_channel: SaleChannel::Store,
                related_order_id: None,
                idempotency_key: None,
            },
            None,
        )
        .await
        .expect("record sale");

    let low_stock = ctx.inventory.list_low_stock(100).await.expect("list low stock");
    assert_eq!(low_stock.len(), 1);
    assert_eq!(low_stock[0].product_id, 1004);

    let tasks = ctx
        .automation
        .list_tasks(
            Some(AutomationTaskStatus::Open),
            Some("restock".to_string()),
            None,
            &fulfillment_core::types::CallerContext {
                user_id: 0,
                username: "system".to_string(),
                is_system_admin: true,
            },
            50,
            0,
        )
        .await
        .expect("list restock tasks");
    assert!(
        tasks.iter().any(|t| t.metadata["inventory_id"] == low_stock[0].id),
        "low-stock hook should have opened a restock task for this item"
    );
}
