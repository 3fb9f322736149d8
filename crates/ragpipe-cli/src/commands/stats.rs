//! Stats command

use super::open_database;
use crate::app::{OutputFormat, StatsArgs};
use anyhow::Result;

pub fn run(args: StatsArgs, format: OutputFormat) -> Result<()> {
    let db = open_database()?;
    let stats = db.get_stats()?;

    if args.documents {
        let docs = db.list_documents(args.owner.as_deref())?;
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&docs)?),
            _ => {
                for d in &docs {
                    println!("{:<16} {:<10} {:>5}  {}", d.document_id, d.owner, d.chunks, d.source);
                }
                if docs.is_empty() {
                    println!("No documents");
                }
            }
        }
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        _ => {
            println!("Documents:       {}", stats.documents);
            println!("Chunks:          {}", stats.chunks);
            println!("Owners:          {}", stats.owners);
            println!();
            println!("Table chunks:    {}", stats.table_chunks);
            println!("Placeholder embeddings: {}", stats.placeholder_embeddings);
        }
    }
    Ok(())
}
