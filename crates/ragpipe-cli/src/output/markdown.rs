//! Markdown output formatter

use ragpipe_core::{ChunkingResult, ContextResponse};

pub fn format_chunking(result: &ChunkingResult) -> String {
    let mut output = format!(
        "# Chunks ({}, confidence {:.2})\n\n",
        result.metadata.doc_type, result.metadata.confidence
    );

    for chunk in &result.chunks {
        output.push_str(&format!("## Chunk {}", chunk.chunk_index + 1));
        if let Some(section) = &chunk.section {
            output.push_str(&format!(" - {}", section));
        }
        output.push_str("\n\n");
        if let Some(lines) = chunk.lines {
            output.push_str(&format!("- **Lines**: {}-{}\n", lines.start + 1, lines.end + 1));
        }
        output.push_str(&format!("- **Words**: {}\n", chunk.word_count));
        if chunk.has_table {
            output.push_str("- **Table**: yes\n");
        }
        output.push_str(&format!("\n```\n{}\n```\n\n", chunk.content));
    }

    if result.chunks.is_empty() {
        output.push_str("*No chunks*\n");
    }
    output
}

pub fn format_context(response: &ContextResponse) -> String {
    let mut output = format!("# Retrieval Results\n\n**Confidence**: {}\n\n", response.confidence);

    for (i, r) in response.results.iter().enumerate() {
        output.push_str(&format!(
            "## {}. {} #{} (Score: {:.2})\n\n",
            i + 1,
            r.chunk.source,
            r.chunk.chunk_index,
            r.final_score
        ));
        output.push_str(&format!("- **Method**: {}\n", r.method));
        if let Some(section) = &r.chunk.section {
            output.push_str(&format!("- **Section**: {}\n", section));
        }
        output.push_str("\n---\n\n");
    }

    output.push_str("## Context\n\n");
    output.push_str(&response.context);
    output.push('\n');
    output
}
