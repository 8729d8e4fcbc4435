use futures::StreamExt;
use tokio_test::{assert_err, assert_ok};

use crate::{
    registry::{Registry, Settlement},
    script, RenderError, RequestId, SuspenseConfig,
};

#[test]
fn auto_ids_increment() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (first, _first_stream) = registry.open(None)?;
    let (second, _second_stream) = registry.open(None)?;
    assert_eq!(first.id, RequestId::from(1));
    assert_eq!(second.id, RequestId::from(2));
    assert_ne!(first.generation, second.generation);
    assert_eq!(registry.len(), 2);
    Ok(())
}

#[test]
fn auto_ids_skip_ids_in_use() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (_, _explicit) = registry.open(Some(RequestId::from(1)))?;
    let (auto, _auto) = registry.open(None)?;
    assert_eq!(auto.id, RequestId::from(2));
    Ok(())
}

#[test]
fn auto_ids_wrap_around() -> anyhow::Result<()> {
    let registry = Registry::new();
    registry.set_counter(u64::MAX);
    let (last, _last) = registry.open(None)?;
    let (wrapped, _wrapped) = registry.open(None)?;
    assert_eq!(last.id, RequestId::from(u64::MAX));
    assert_eq!(wrapped.id, RequestId::from(1));
    Ok(())
}

#[test]
fn duplicate_explicit_id() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (key, _stream) = registry.open(Some("page".into()))?;
    let err = assert_err!(registry.open(Some(key.id.clone())));
    assert!(matches!(err, RenderError::DuplicateRequestId(dup) if dup == key.id));
    assert_eq!(registry.len(), 1);

    registry.discard(&key);
    assert_ok!(registry.open(Some(key.id)));
    Ok(())
}

#[test]
fn register_requires_record() {
    let registry = Registry::new();
    let err = assert_err!(registry.register(&RequestId::from(9), None));
    assert!(matches!(err, RenderError::MissingRequestRecord(_)));
}

#[test]
fn run_ids_are_never_reused() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (key, _stream) = registry.open(None)?;
    let first = registry.register(&key.id, None)?;
    let second = registry.register(&key.id, None)?;
    registry.settle(&key, first.run, Ok(String::new()));
    let third = registry.register(&key.id, None)?;

    assert_eq!((first.run, second.run, third.run), (1, 2, 3));
    assert_eq!(registry.running(&key.id), Some(2));
    Ok(())
}

#[tokio::test]
async fn last_settlement_closes() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (key, stream) = registry.open(None)?;
    let first = registry.register(&key.id, None)?;
    let second = registry.register(&key.id, None)?;

    registry.complete_root(&key, Ok("<shell>".into()));
    assert_eq!(registry.script_sent(&key.id), Some(false));

    registry.settle(&key, second.run, Ok("b".into()));
    assert_eq!(registry.script_sent(&key.id), Some(true));
    assert_eq!(registry.running(&key.id), Some(1));

    registry.settle(&key, first.run, Ok("a".into()));
    assert!(!registry.contains(&key.id));

    // anything after the close is dropped
    registry.settle(&key, first.run, Ok("late".into()));
    registry.complete_root(&key, Ok("late".into()));

    let chunks = stream.collect::<Vec<_>>().await;
    let chunks = chunks.into_iter().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        chunks,
        vec![
            "<shell>".to_string(),
            format!("{}{}", script::SUSPENSE_SCRIPT, script::patch(2, "b")),
            script::patch(1, "a"),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn settling_before_root_keeps_request_open() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (key, _stream) = registry.open(None)?;
    let slot = registry.register(&key.id, None)?;
    registry.settle(&key, slot.run, Ok("early".into()));
    assert_eq!(registry.running(&key.id), Some(0));

    registry.complete_root(&key, Ok(String::new()));
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn auto_script_disabled() -> anyhow::Result<()> {
    let registry = Registry::with_config(SuspenseConfig { auto_script: false });
    let (key, stream) = registry.open(None)?;
    let slot = registry.register(&key.id, None)?;
    registry.complete_root(&key, Ok("<shell>".into()));
    registry.settle(&key, slot.run, Ok("x".into()));

    assert_eq!(stream.into_string().await?, format!("<shell>{}", script::patch(1, "x")));
    Ok(())
}

#[tokio::test]
async fn failed_root_tears_down() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (key, stream) = registry.open(None)?;
    let slot = registry.register(&key.id, None)?;
    registry.complete_root(&key, Err(RenderError::msg("root failed")));
    assert!(registry.is_empty());

    registry.settle(&key, slot.run, Ok("orphan".into()));

    let chunks = stream.collect::<Vec<_>>().await;
    assert_eq!(chunks.len(), 1);
    assert!(matches!(&chunks[0], Err(RenderError::Component(m)) if m == "root failed"));
    Ok(())
}

#[tokio::test]
async fn abandoned_settlement_reports_failure() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (key, stream) = registry.open(None)?;
    let slot = registry.register(&key.id, None)?;
    registry.complete_root(&key, Ok("<shell>".into()));

    drop(Settlement::block(&registry, &key, slot.run));
    assert!(registry.is_empty());

    let chunks = stream.collect::<Vec<_>>().await;
    assert_eq!(chunks.len(), 2);
    assert!(matches!(&chunks[1], Err(RenderError::Task(_))));
    Ok(())
}

#[test]
fn discarded_settlement_reports_nothing() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (key, _stream) = registry.open(None)?;
    Settlement::root(&registry, &key).discard();
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn stale_settlement_ignored_after_id_reuse() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (old, _old_stream) = registry.open(Some("reused".into()))?;
    let stale = registry.register(&old.id, None)?;
    registry.discard(&old);

    let (key, stream) = registry.open(Some("reused".into()))?;
    assert_eq!(key.id, old.id);
    let fresh = registry.register(&key.id, None)?;
    assert_eq!(stale.run, fresh.run);

    registry.settle(&stale.key, stale.run, Ok("stale".into()));
    registry.complete_root(&old, Ok("stale shell".into()));
    assert_eq!(registry.running(&key.id), Some(1));
    assert_eq!(registry.script_sent(&key.id), Some(false));

    registry.complete_root(&key, Ok("<shell>".into()));
    assert!(registry.contains(&key.id));
    registry.settle(&fresh.key, fresh.run, Ok("fresh".into()));
    assert!(registry.is_empty());

    let chunks = stream.collect::<Vec<_>>().await;
    let chunks = chunks.into_iter().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        chunks,
        vec![
            "<shell>".to_string(),
            format!("{}{}", script::SUSPENSE_SCRIPT, script::patch(1, "fresh")),
        ]
    );
    Ok(())
}

#[test]
fn stale_generation_cannot_register() -> anyhow::Result<()> {
    let registry = Registry::new();
    let (old, _old_stream) = registry.open(Some("reused".into()))?;
    registry.discard(&old);
    let (key, _stream) = registry.open(Some("reused".into()))?;

    let err = assert_err!(registry.register(&old.id, Some(old.generation)));
    assert!(matches!(err, RenderError::MissingRequestRecord(_)));
    assert!(registry.holds(&key));
    assert!(!registry.holds(&old));

    // a stale discard leaves the current record alone
    registry.discard(&old);
    assert_eq!(registry.running(&key.id), Some(0));
    assert_ok!(registry.register(&key.id, Some(key.generation)));
    Ok(())
}
