//! Restart test: rule state rebuilt from the journal produces the same
//! rejection a live run would.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rg_core::config::{BadTradesConfig, CheckConfig, DrawdownConfig, MoratoriumConfig, PriceCheckConfig};
use rg_core::message::Message;
use rg_engine::RiskEngine;
use rg_journal::{Journal, JournalSettings};
use rg_rules::{NewOrderMoratorium, PriceCheck, SeqBadTrades, TrailingDrawdown};

fn build_engine() -> Arc<RiskEngine> {
    let engine = Arc::new(RiskEngine::new());
    let check = CheckConfig { moratorium_s: 60 };
    engine.add_check(NewOrderMoratorium::new(
        &MoratoriumConfig { timeout_ms: 1_000 },
        &check,
    ));
    engine.add_check(PriceCheck::subscribe(
        engine.bus(),
        &PriceCheckConfig {
            timeframe_s: 3 * 3_600,
            deviation: 0.05,
        },
        &check,
    ));
    engine.add_check(SeqBadTrades::subscribe(
        engine.bus(),
        &BadTradesConfig {
            timeframe_s: 60,
            max_count: 5,
        },
        &check,
    ));
    engine.add_check(TrailingDrawdown::subscribe(
        engine.bus(),
        &DrawdownConfig {
            window_s: 24 * 3_600,
            limit: 100.0,
        },
        &check,
    ));
    engine
}

fn settings(dir: &std::path::Path) -> JournalSettings {
    JournalSettings {
        dir: dir.to_path_buf(),
        program: "rg-restart-test".into(),
        retention: Duration::from_secs(24 * 3_600),
        tick: Duration::from_millis(10),
    }
}

fn quote(symbol: &str, price: &str, time: &str) -> Message {
    Message::build("Quote", [("symbol", symbol), ("price", price), ("time", time)])
}

fn trade(user: &str, symbol: &str, side: &str, price: &str, qty: &str, time: &str) -> Message {
    Message::build(
        "Trade",
        [
            ("trade_id", "T1"),
            ("user_id", user),
            ("symbol", symbol),
            ("side", side),
            ("price", price),
            ("qty", qty),
            ("time", time),
        ],
    )
}

fn order(user: &str, symbol: &str, time: &str) -> Message {
    Message::build(
        "Order",
        [
            ("order_id", "O1"),
            ("user_id", user),
            ("type", "1"),
            ("symbol", symbol),
            ("side", "B"),
            ("price", "95"),
            ("qty", "1"),
            ("time", time),
        ],
    )
}

fn reject_attr(response: &Message) -> Option<String> {
    response
        .attrs()
        .iter()
        .find(|(k, _)| k == "reject")
        .map(|(_, v)| v.clone())
}

/// Drive the drawdown scenario live, restart against the same data dir,
/// and expect the same verdict for the same subsequent order.
#[test]
fn restart_reproduces_drawdown_rejection() {
    let dir = tempfile::tempdir().expect("tempdir");

    // ── Run 1: live traffic, journaled ───────────────────────────
    let verdict_live = {
        let engine = build_engine();
        let cancel = CancellationToken::new();
        let journal =
            Journal::spawn(&engine, settings(dir.path()), cancel.clone()).expect("spawn journal");

        engine.handle(&quote("X", "100", "2024-03-01 10:00:00.000"));
        engine.handle(&trade("U", "X", "B", "100", "10", "2024-03-01 10:00:01.000"));
        engine.handle(&quote("X", "110", "2024-03-01 10:00:02.000"));
        engine.handle(&quote("X", "90", "2024-03-01 10:00:03.000"));

        let response = engine
            .handle(&order("U", "X", "2024-03-01 10:00:10.000"))
            .expect("order response");
        cancel.cancel();
        journal.stop();
        reject_attr(&response)
    };
    assert_eq!(verdict_live.as_deref(), Some("TrailingDrawdown, 200"));

    // ── Run 2: fresh process, state rebuilt from the journal ─────
    let verdict_replayed = {
        let engine = build_engine();
        let cancel = CancellationToken::new();
        let journal =
            Journal::spawn(&engine, settings(dir.path()), cancel.clone()).expect("spawn journal");

        let response = engine
            .handle(&order("U", "X", "2024-03-01 10:00:10.000"))
            .expect("order response");
        cancel.cancel();
        journal.stop();
        reject_attr(&response)
    };

    assert_eq!(verdict_live, verdict_replayed);
}

/// An accepted order stays accepted across a restart.
#[test]
fn restart_reproduces_acceptance() {
    let dir = tempfile::tempdir().expect("tempdir");

    let run = |feed: bool| {
        let engine = build_engine();
        let cancel = CancellationToken::new();
        let journal =
            Journal::spawn(&engine, settings(dir.path()), cancel.clone()).expect("spawn journal");

        if feed {
            // Only the first run feeds traffic.
            engine.handle(&quote("X", "100", "2024-03-01 10:00:00.000"));
        }

        let response = engine
            .handle(&order("U", "X", "2024-03-01 10:00:10.000"))
            .expect("order response");
        cancel.cancel();
        journal.stop();
        reject_attr(&response)
    };

    let first = run(true);
    let second = run(false);
    assert_eq!(first, None, "limit buy at 95 against avg 100 is in band");
    assert_eq!(first, second);
}
