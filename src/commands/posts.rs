use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

use waypost::config::Config;
use waypost::content::{
    ChatCompletionGenerator, ContentExtractor, HttpExtractor, PostGenerator, SourceInput,
    StyleParams,
};
use waypost::models::{Draft, PostTone, PostType, SourceRef};
use waypost::scheduler::EntryStatus;
use waypost::storage::{DraftRepository, ScheduleRepository};
use waypost::utils::truncate_text;

use super::open_store;

/// Generate draft posts from a source and store them
pub async fn create(
    config: Config,
    source: String,
    tone: String,
    post_type: String,
    variants: u32,
    context: Option<String>,
) -> Result<()> {
    let Some(tone) = PostTone::parse(&tone) else {
        bail!("Unknown tone '{}'", tone);
    };
    let Some(post_type) = PostType::parse(&post_type) else {
        bail!("Unknown post type '{}'", post_type);
    };
    let style =
        StyleParams::new(tone, post_type, variants).context("Invalid style parameters")?;

    let store = open_store(&config)?;

    let extractor = HttpExtractor::new(Duration::from_secs(30))
        .context("Failed to build content extractor")?;
    let generator = ChatCompletionGenerator::new(config.generator_settings())
        .context("Failed to build post generator")?;

    let input = SourceInput::from_arg(&source);
    println!("Extracting content from {}", input.identifier());
    let content = extractor
        .extract(&input)
        .await
        .context("Content extraction failed")?;
    println!(
        "Extracted {} words{}",
        content.word_count(),
        content
            .title
            .as_deref()
            .map(|t| format!(" from \"{}\"", t))
            .unwrap_or_default()
    );

    let posts = generator
        .generate(&[content.clone()], style, context.as_deref())
        .await
        .context("Post generation failed")?;

    let now = chrono::Utc::now();
    for post in posts {
        let mut draft = Draft::new(post.content, now);
        draft.tone = post.tone;
        draft.post_type = post.post_type;
        draft.model_used = Some(post.model_used);
        draft.sources = vec![SourceRef {
            url: content.source.clone(),
            title: content.title.clone(),
        }];

        store.insert_draft(&draft).await?;
        println!("\nDraft {} (variant {}):", draft.id, post.variant);
        println!("{}", draft.content);
    }

    Ok(())
}

/// List stored drafts
pub async fn list_drafts(config: Config, limit: usize) -> Result<()> {
    let store = open_store(&config)?;
    let drafts = store.list_drafts(limit).await?;

    if drafts.is_empty() {
        println!("No drafts stored");
        return Ok(());
    }

    for draft in drafts {
        println!(
            "{}  {}  [{} / {}]  {}",
            draft.id,
            draft.created_at.format("%Y-%m-%d %H:%M"),
            draft.tone.as_str(),
            draft.post_type.as_str(),
            truncate_text(&draft.content.replace('\n', " "), 60),
        );
    }

    Ok(())
}

/// List schedule entries, optionally filtered by status
pub async fn list_entries(config: Config, status: Option<String>, limit: usize) -> Result<()> {
    let status = match status {
        Some(value) => Some(
            value
                .parse::<EntryStatus>()
                .with_context(|| format!("Unknown status '{}'", value))?,
        ),
        None => None,
    };

    let store = open_store(&config)?;
    let entries = store.list_entries(status, limit).await?;

    if entries.is_empty() {
        println!("No matching schedule entries");
        return Ok(());
    }

    print_entries(&store, entries).await
}

async fn print_entries(
    store: &Arc<waypost::storage::SqliteStore>,
    entries: Vec<waypost::models::ScheduleEntry>,
) -> Result<()> {
    for entry in entries {
        let preview = match store.get_draft(entry.draft_id).await? {
            Some(draft) => truncate_text(&draft.content.replace('\n', " "), 40),
            None => String::from("(draft missing)"),
        };

        let detail = match entry.status {
            EntryStatus::Published => entry
                .receipt
                .as_ref()
                .and_then(|r| r.post_url.clone())
                .unwrap_or_default(),
            EntryStatus::Failed => entry.last_error.clone().unwrap_or_default(),
            _ if entry.attempt_count > 0 => format!("attempts: {}", entry.attempt_count),
            _ => String::new(),
        };

        println!(
            "{}  {}  {:<12}  {}  {}",
            entry.id,
            entry.target_at.format("%Y-%m-%d %H:%M"),
            entry.status.as_str(),
            preview,
            detail,
        );
    }

    Ok(())
}
