use super::*;
use price_monitor::notifier::stream::Delivery;
use price_monitor::store::ChangeFeed;

#[tokio::test]
async fn test_price_change_sends_one_alert() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "widget", "$12.00").await;
    ctx.add_item("widget", "Widget", "$10.00").await?;

    ctx.app.checker().run_pass().await?;

    // insert, then modify
    let delivered = ctx.app.stream_worker().drain().await?;
    assert_eq!(delivered, 2);

    let sent = ctx.mailer.sent().await;
    assert_eq!(sent.len(), 1);

    let mail = &sent[0];
    assert_eq!(mail.from, "shopper@example.com");
    assert_eq!(mail.to, vec!["shopper@example.com".to_string()]);
    assert_eq!(mail.subject, "💰 Price alert - Widget");
    assert!(mail.html_body.contains("$10.00"));
    assert!(mail.html_body.contains("$12.00"));
    assert!(mail.html_body.contains("Widget"));

    Ok(())
}

#[tokio::test]
async fn test_quiet_passes_send_nothing() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "widget", "$10.00").await;
    ctx.add_item("widget", "Widget", "$10.00").await?;

    ctx.app.checker().run_pass().await?;
    ctx.app.checker().run_pass().await?;
    ctx.app.stream_worker().drain().await?;

    assert!(ctx.mailer.sent().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_each_price_move_alerts_once() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    ctx.serve_price("widget", "$11").await;
    ctx.add_item("widget", "Widget", "$10").await?;

    ctx.app.checker().run_pass().await?;
    ctx.serve_price("widget", "$9").await;
    ctx.app.checker().run_pass().await?;

    let mut worker = ctx.app.stream_worker();
    worker.drain().await?;
    // A second drain finds nothing new
    assert_eq!(worker.drain().await?, 0);

    let sent = ctx.mailer.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent[0].html_body.contains("$10") && sent[0].html_body.contains("$11"));
    assert!(sent[1].html_body.contains("$11") && sent[1].html_body.contains("$9"));

    Ok(())
}

#[tokio::test]
async fn test_removing_an_item_sends_nothing() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    let id = ctx.add_item("widget", "Widget", "$10").await?;

    ctx.app.remove_item(&id).await?;
    let delivered = ctx.app.stream_worker().drain().await?;

    assert_eq!(delivered, 2);
    assert!(ctx.mailer.sent().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_mail_failure_is_redelivered_then_dropped() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "widget", "$12").await;
    ctx.add_item("widget", "Widget", "$10").await?;
    ctx.app.checker().run_pass().await?;

    let mut worker = ctx.app.stream_worker();
    assert!(matches!(worker.poll_once().await?, Delivery::Handled { .. }));

    ctx.mailer.set_failing(true);
    assert!(matches!(worker.poll_once().await, Err(AppError::Mail(_))));
    // Still pending after the failed attempt
    assert_eq!(ctx.store.read_changes("price-notifier", 10).await?.len(), 1);

    assert!(matches!(worker.poll_once().await?, Delivery::Dropped { .. }));
    assert!(ctx.store.read_changes("price-notifier", 10).await?.is_empty());
    assert!(ctx.mailer.sent().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_checkpoint_survives_worker_restart() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "widget", "$12").await;
    ctx.add_item("widget", "Widget", "$10").await?;
    ctx.app.checker().run_pass().await?;

    ctx.app.stream_worker().drain().await?;
    assert_eq!(ctx.mailer.sent().await.len(), 1);

    // A fresh worker resumes from the committed checkpoint
    assert_eq!(ctx.app.stream_worker().drain().await?, 0);
    assert_eq!(ctx.mailer.sent().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_attempts_persist_across_notify_runs() -> anyhow::Result<()> {
    let ctx = create_test_context().await?;
    mount_price(&ctx.server, "widget", "$12").await;
    ctx.add_item("widget", "Widget", "$10").await?;
    ctx.app.checker().run_pass().await?;
    ctx.mailer.set_failing(true);

    // Each run starts a fresh worker, as the `notify` command does
    assert!(ctx.app.stream_worker().drain().await.is_err());
    assert_eq!(ctx.app.stream_worker().drain().await?, 1);
    assert!(ctx.store.read_changes("price-notifier", 10).await?.is_empty());

    Ok(())
}
