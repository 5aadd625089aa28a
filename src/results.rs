//! `sift results`: ranked relevant items for a query.

use anyhow::Result;

use crate::store::ItemStore;

pub async fn run_results(
    store: &dyn ItemStore,
    query: &str,
    min_score: u8,
    limit: usize,
) -> Result<()> {
    let hits = store.relevant_items(query, min_score, limit).await?;

    if hits.is_empty() {
        println!("No results for \"{}\" with score >= {}.", query, min_score);
        return Ok(());
    }

    for (i, (item, record)) in hits.iter().enumerate() {
        println!(
            "{}. [{:>3}] {} ({})",
            i + 1,
            record.score,
            item.title,
            record.label
        );
        println!("    source:    {}", item.source_name);
        println!("    published: {}", item.published_at.format("%Y-%m-%d %H:%M"));
        if !item.link.is_empty() {
            println!("    link:      {}", item.link);
        }
        if !record.summary.is_empty() {
            println!("    summary:   {}", record.summary);
        }
        if !record.key_information.is_empty() {
            println!("    key info:  {}", record.key_information);
        }
        println!();
    }

    Ok(())
}
