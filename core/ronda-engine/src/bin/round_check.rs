//! Debug utility for inspecting round/index store health in local environments.

use ronda_engine::elapsed;
use ronda_engine::{HistoricalIndexResolver, IndexStore, RoundStore, StorageConfig};
use ronda_model::{normalize_subject_key, SourceKind};

fn main() {
    let storage = StorageConfig::default();

    println!("═══════════════════════════════════════════════════════════");
    println!("  Vigia Round Check - Validation Harness");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    println!("Rounds file: {}", storage.rounds_file().display());
    println!("Index file:  {}", storage.index_file().display());
    println!();

    let round_store = RoundStore::load(&storage.rounds_file());
    let index_store = IndexStore::load(&storage.index_file());

    println!("── Finalized Rounds ──────────────────────────────────────");
    if round_store.is_empty() {
        println!("  (no finalized rounds)");
    }
    let mut records: Vec<_> = round_store.all().collect();
    records.sort_by(|a, b| a.round.end_time.cmp(&b.round.end_time));
    for record in &records {
        let recomputed = match (record.round.start_time, record.round.end_time) {
            (Some(start), Some(end)) => elapsed::elapsed(
                end,
                Some(start),
                Some(end),
                &record.round.pauses,
            )
            .num_milliseconds(),
            _ => 0,
        };
        let status = if recomputed == record.duration_ms {
            "✓ OK"
        } else {
            "✗ DRIFT"
        };
        println!(
            "  {} {} operator={} items={} duration_ms={} recomputed={}",
            status,
            record.round.id,
            record.round.operator,
            record.round.work_items.len(),
            record.duration_ms,
            recomputed
        );
    }
    println!();

    println!("── Channel Index ─────────────────────────────────────────");
    println!("  {} subject(s) indexed", index_store.subject_count());
    println!();

    let args: Vec<String> = std::env::args().collect();
    if let Some(subject) = args.get(1) {
        let key = normalize_subject_key(subject);
        println!("── Resolved View: {key} ──");

        let mut resolver = HistoricalIndexResolver::new();
        resolver.apply_update(
            SourceKind::FinalizedRound,
            round_store.finalized_records_for(&key),
        );
        resolver.apply_update(SourceKind::PersistedIndex, index_store.records_for(&key));
        // Manual notations live in the dashboard's document store and are
        // not reachable from here.
        resolver.mark_unavailable(SourceKind::ManualNotation);

        let view = resolver.resolve_subject(&key);
        if view.channels.is_empty() {
            println!("  (no channel history)");
        }
        for (number, record) in &view.channels {
            println!(
                "  ch {:>3}  {:<8} via {} at {}",
                number,
                record.status.as_str(),
                record.source.as_str(),
                record.updated_at.to_rfc3339()
            );
        }
    } else {
        println!("Pass a subject name to print its resolved channel view.");
    }
}
