use super::*;
use price_monitor::models::EventKind;
use price_monitor::store::{ChangeFeed, ItemStore};

#[tokio::test]
async fn test_first_pass_records_current_price() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "widget", "$19.99").await;
    let id = ctx.add_item("widget", "Widget", "").await?;

    let report = ctx.app.checker().run_pass().await?;

    assert_eq!(report.items_scanned, 1);
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.changed_ids, vec![id.clone()]);
    assert_eq!(ctx.app.get_item(&id).await?.price, "$19.99");

    Ok(())
}

#[tokio::test]
async fn test_unchanged_prices_write_nothing() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "widget", "$19.99").await;
    ctx.add_item("widget", "Widget", "$19.99").await?;

    let report = ctx.app.checker().run_pass().await?;
    assert_eq!(report.changes_detected(), 0);

    // Only the insert from adding the item
    let changes = ctx.store.read_changes("audit", 10).await?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].event.event_kind, EventKind::Insert);

    Ok(())
}

#[tokio::test]
async fn test_only_moved_items_are_updated() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "steady", "$5.00").await;
    mount_price(&ctx.server, "moving", "$7.50").await;
    let steady = ctx.add_item("steady", "Steady", "$5.00").await?;
    let moving = ctx.add_item("moving", "Moving", "$8.00").await?;

    let report = ctx.app.checker().run_pass().await?;

    assert_eq!(report.items_scanned, 2);
    assert_eq!(report.changed_ids, vec![moving.clone()]);
    assert_eq!(ctx.app.get_item(&steady).await?.price, "$5.00");

    let updated = ctx.app.get_item(&moving).await?;
    assert_eq!(updated.price, "$7.50");
    assert_eq!(updated.item, "Moving");
    assert_eq!(updated.selector, "span.price");
    assert_eq!(updated.email, "shopper@example.com");

    Ok(())
}

#[tokio::test]
async fn test_selector_miss_stores_empty_price() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    Mock::given(method("GET"))
        .and(path("/sold-out"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Sold out</body></html>"))
        .mount(&ctx.server)
        .await;
    let id = ctx.add_item("sold-out", "Widget", "$3").await?;

    let report = ctx.app.checker().run_pass().await?;

    assert_eq!(report.changes_detected(), 1);
    assert_eq!(ctx.app.get_item(&id).await?.price, "");

    Ok(())
}

#[tokio::test]
async fn test_failed_fetch_leaves_store_untouched() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "ok", "$2").await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.server)
        .await;
    let ok = ctx.add_item("ok", "Fine", "$1").await?;
    ctx.add_item("broken", "Broken", "$1").await?;

    let result = ctx.app.checker().run_pass().await;

    assert!(matches!(result, Err(AppError::Fetch { .. })));
    assert_eq!(ctx.app.get_item(&ok).await?.price, "$1");
    assert_eq!(ctx.store.read_changes("audit", 10).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_empty_store_fetches_nothing() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ctx.server)
        .await;

    let report = ctx.app.checker().run_pass().await?;

    assert_eq!(report.items_scanned, 0);
    assert!(ctx.store.scan_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_slow_shop_exceeds_pass_deadline() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(price_page("$2"))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&ctx.server)
        .await;
    let id = ctx.add_item("slow", "Slow", "$1").await?;

    let result = ctx
        .app
        .checker()
        .run_with_deadline(std::time::Duration::from_millis(200))
        .await;

    assert!(matches!(result, Err(AppError::DeadlineExceeded { .. })));
    assert_eq!(ctx.app.get_item(&id).await?.price, "$1");

    Ok(())
}

#[tokio::test]
async fn test_pass_writes_every_changed_item() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    let mut ids = Vec::new();
    for i in 0..6 {
        let page = format!("item-{}", i);
        mount_price(&ctx.server, &page, "$2").await;
        ids.push(ctx.add_item(&page, &format!("Item {}", i), "$1").await?);
    }

    let report = ctx.app.checker().run_pass().await?;

    let mut changed = report.changed_ids.clone();
    changed.sort();
    ids.sort();
    assert_eq!(changed, ids);
    for id in &ids {
        assert_eq!(ctx.app.get_item(id).await?.price, "$2");
    }

    // six inserts, six modifies
    assert_eq!(ctx.store.read_changes("audit", 100).await?.len(), 12);

    Ok(())
}
