mod common;

use assert_matches::assert_matches;
use common::{date, price, TestWarehouse};
use sea_orm::EntityTrait;
use warehouse_engine::{
    entities::supply, MovementKind, RecordSupplyCommand, ServiceError, SupplyLineInput,
};

fn two_line_supply(product_a: i64, product_b: i64) -> RecordSupplyCommand {
    RecordSupplyCommand {
        supplier: "Dairy Plant #2".to_string(),
        delivered_on: date(2024, 9, 1),
        delivery_price: Some(price(500)),
        comment: Some("morning truck".to_string()),
        lines: vec![
            SupplyLineInput {
                product_id: product_a,
                quantity: 30,
                unit_price: price(11),
            },
            SupplyLineInput {
                product_id: product_b,
                quantity: 20,
                unit_price: price(14),
            },
        ],
    }
}

#[tokio::test]
async fn record_supply_creates_all_batches_atomically() {
    let wh = TestWarehouse::new().await;
    let milk = wh.create_product("Milk 1L", "dairy", 1).await;
    let curd = wh.create_product("Curd", "dairy", 1).await;

    let result = wh
        .service
        .record_supply(two_line_supply(milk, curd))
        .await
        .unwrap();
    assert_eq!(result.batch_ids.len(), 2);

    let milk_batches = wh.service.get_batches(milk).await.unwrap();
    assert_eq!(milk_batches.len(), 1);
    assert_eq!(milk_batches[0].initial_quantity, 30);
    assert_eq!(milk_batches[0].remaining_quantity, 30);
    assert_eq!(milk_batches[0].supply_id, result.supply_id);
    assert_eq!(milk_batches[0].delivered_on, date(2024, 9, 1));

    let curd_batches = wh.service.get_batches(curd).await.unwrap();
    assert_eq!(curd_batches.len(), 1);
    assert_eq!(curd_batches[0].unit_price, price(14));
}

#[tokio::test]
async fn record_supply_with_unknown_product_persists_nothing() {
    let wh = TestWarehouse::new().await;
    let milk = wh.create_product("Milk 1L", "dairy", 1).await;

    let err = wh
        .service
        .record_supply(two_line_supply(milk, 424242))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    // No partial supply: the valid line must not have been persisted either.
    let supplies = supply::Entity::find().all(wh.db.as_ref()).await.unwrap();
    assert!(supplies.is_empty());
    assert!(wh.service.get_batches(milk).await.unwrap().is_empty());
}

#[tokio::test]
async fn record_supply_rejects_malformed_lines() {
    let wh = TestWarehouse::new().await;
    let milk = wh.create_product("Milk 1L", "dairy", 1).await;

    let mut bad_quantity = two_line_supply(milk, milk);
    bad_quantity.lines[0].quantity = 0;
    assert_matches!(
        wh.service.record_supply(bad_quantity).await.unwrap_err(),
        ServiceError::ValidationError(_)
    );

    let mut bad_price = two_line_supply(milk, milk);
    bad_price.lines[1].unit_price = price(-3);
    assert_matches!(
        wh.service.record_supply(bad_price).await.unwrap_err(),
        ServiceError::ValidationError(_)
    );

    let mut bad_delivery_price = two_line_supply(milk, milk);
    bad_delivery_price.delivery_price = Some(price(-500));
    assert_matches!(
        wh.service
            .record_supply(bad_delivery_price)
            .await
            .unwrap_err(),
        ServiceError::ValidationError(_)
    );

    let mut empty = two_line_supply(milk, milk);
    empty.lines.clear();
    assert_matches!(
        wh.service.record_supply(empty).await.unwrap_err(),
        ServiceError::InvalidOperation(_)
    );
}

#[tokio::test]
async fn cascade_delete_removes_exactly_the_supply_rows() {
    let wh = TestWarehouse::new().await;
    let milk = wh.create_product("Milk 1L", "dairy", 1).await;
    let bread = wh.create_product("Bread", "bakery", 1).await;

    // One supply with two milk batches; three movements against them.
    let supply_result = wh
        .service
        .record_supply(RecordSupplyCommand {
            supplier: "Dairy Plant #2".to_string(),
            delivered_on: date(2024, 9, 3),
            delivery_price: None,
            comment: None,
            lines: vec![
                SupplyLineInput {
                    product_id: milk,
                    quantity: 5,
                    unit_price: price(10),
                },
                SupplyLineInput {
                    product_id: milk,
                    quantity: 5,
                    unit_price: price(10),
                },
            ],
        })
        .await
        .unwrap();

    // 7 spans both batches (2 movements), 1 hits the second (1 movement).
    wh.service
        .consume(milk, 7, MovementKind::Sale, None)
        .await
        .unwrap();
    wh.service
        .consume(milk, 1, MovementKind::Sale, None)
        .await
        .unwrap();
    assert_eq!(
        wh.service
            .movements_for_supply(supply_result.supply_id)
            .await
            .unwrap()
            .len(),
        3
    );

    // Unrelated product with its own supply.
    wh.record_single_batch(bread, date(2024, 9, 3), 8, price(4))
        .await;
    let bread_before = wh.service.product_summary(bread).await.unwrap();

    let deletion = wh
        .service
        .delete_supply(supply_result.supply_id)
        .await
        .unwrap();
    assert_eq!(deletion.batches_removed, 2);
    assert_eq!(deletion.movements_removed, 3);
    assert_eq!(deletion.product_ids, vec![milk]);

    let milk_summary = wh.service.product_summary(milk).await.unwrap();
    assert_eq!(milk_summary.total_supplied, 0);
    assert_eq!(milk_summary.total_sold, 0);
    assert_eq!(milk_summary.total_remaining, 0);

    assert_eq!(wh.service.product_summary(bread).await.unwrap(), bread_before);
}

#[tokio::test]
async fn delete_unknown_supply_is_not_found() {
    let wh = TestWarehouse::new().await;
    let err = wh.service.delete_supply(31337).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn batch_audit_trail_is_chronological() {
    let wh = TestWarehouse::new().await;
    let milk = wh.create_product("Milk 1L", "dairy", 1).await;
    let (supply_id, batch_id) = wh
        .record_single_batch(milk, date(2024, 10, 1), 20, price(10))
        .await;

    wh.service
        .consume(milk, 5, MovementKind::Sale, Some("order #1".to_string()))
        .await
        .unwrap();
    wh.service
        .consume(milk, 2, MovementKind::WriteOff, Some("dropped crate".to_string()))
        .await
        .unwrap();
    wh.service
        .consume(milk, 3, MovementKind::Sale, Some("order #2".to_string()))
        .await
        .unwrap();

    let movements = wh.service.movements_for_batch(batch_id).await.unwrap();
    let quantities: Vec<i32> = movements.iter().map(|m| m.quantity).collect();
    assert_eq!(quantities, vec![5, 2, 3]);
    assert!(movements.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(movements[1].kind, MovementKind::WriteOff);

    // Per-supply listing sees the same three rows.
    assert_eq!(
        wh.service.movements_for_supply(supply_id).await.unwrap().len(),
        3
    );

    assert_matches!(
        wh.service.movements_for_batch(8888).await.unwrap_err(),
        ServiceError::NotFound(_)
    );
}
