//! `sift query add` / `sift query list`.

use anyhow::Result;

use crate::stats::format_ts_iso;
use crate::store::QueryLedger;

pub async fn add_query(ledger: &dyn QueryLedger, text: &str) -> Result<()> {
    let query = ledger.add_query(text).await?;
    if query.is_open() {
        println!("query {} open: {}", query.id, query.text);
    } else {
        println!("query {} already resolved: {}", query.id, query.text);
    }
    Ok(())
}

pub async fn list_queries(ledger: &dyn QueryLedger, open_only: bool) -> Result<()> {
    let queries = if open_only {
        ledger.list_open().await?
    } else {
        ledger.list_queries().await?
    };

    if queries.is_empty() {
        println!("(no queries)");
        return Ok(());
    }

    println!(
        "{:>4}  {:<9} {:<17} {:<40} TEXT",
        "ID", "STATE", "CREATED", "RESOLVED BY"
    );
    for q in &queries {
        let (state, by) = match q.resolved_by_item_identity() {
            Some(identity) => ("resolved", identity),
            None => ("open", "-"),
        };
        println!(
            "{:>4}  {:<9} {:<17} {:<40} {}",
            q.id,
            state,
            format_ts_iso(q.created_at),
            by,
            q.text
        );
    }
    Ok(())
}
