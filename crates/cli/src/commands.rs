// FILE: crates/cli/src/commands.rs

use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use console::style;
use folio_core::{LibraryRow, ResourcePath, RowFilter};
use folio_library::{ImportReport, LibraryManager, MetadataStore, WorkSummary};
use folio_tree::{NodeId, TreeModel};

/// List the tree roots, marking library base paths
pub fn list_roots<S: MetadataStore>(manager: &LibraryManager<S>) -> Result<()> {
    let model = manager.model();
    let base_paths: Vec<ResourcePath> = manager
        .config()
        .library
        .base_paths
        .iter()
        .map(ResourcePath::new)
        .collect();

    println!("\n{} Roots", style(model.roots().len()).bold().cyan());
    println!("{}", "=".repeat(80));
    for node in model.roots().iter().filter_map(|id| model.node(*id)) {
        if base_paths.contains(node.path()) {
            println!("  {} {}", node.path(), style("[library]").green());
        } else {
            println!("  {}", node.path());
        }
    }
    Ok(())
}

/// Add a base path and import the ebooks below it
pub async fn add_base_path<S: MetadataStore>(
    manager: &mut LibraryManager<S>,
    matches: &ArgMatches,
) -> Result<()> {
    let path = resolve_path(required(matches, "path")?)?;

    if !manager
        .add_base_path(&path)
        .await
        .with_context(|| format!("Failed to add {}", path))?
    {
        println!("{} is already a library base path", style(&path).bold());
        return Ok(());
    }
    println!("{} Added {}", style("✓").green().bold(), path);

    let reports = drain(manager).await?;
    print_imports(&reports);
    Ok(())
}

/// Remove a base path and its rows
pub fn remove_base_path<S: MetadataStore>(
    manager: &mut LibraryManager<S>,
    matches: &ArgMatches,
) -> Result<()> {
    let path = resolve_path(required(matches, "path")?)?;
    let is_base_path = manager
        .config()
        .library
        .base_paths
        .iter()
        .any(|p| ResourcePath::new(p) == path);
    if !is_base_path {
        println!("{} is not a library base path", style(&path).bold());
        return Ok(());
    }

    let removed = manager
        .remove_base_path(&path)
        .with_context(|| format!("Failed to remove {}", path))?;
    println!(
        "{} Removed {} ({} rows dropped)",
        style("✓").green().bold(),
        path,
        removed
    );
    Ok(())
}

/// Print the tree below a path, expanding `depth` levels
pub async fn show_tree<S: MetadataStore>(
    manager: &mut LibraryManager<S>,
    matches: &ArgMatches,
) -> Result<()> {
    let path = resolve_path(required(matches, "path")?)?;
    let depth = matches.get_one::<usize>("depth").copied().unwrap_or(1);

    let start = manager
        .reveal(&path)
        .await
        .with_context(|| format!("{} is not reachable from any root", path))?;

    let mut frontier = vec![start];
    for _ in 0..depth {
        for node in &frontier {
            manager.expand(*node)?;
        }
        drain(manager).await?;
        frontier = frontier
            .iter()
            .flat_map(|id| manager.model().loaded_children(*id).to_vec())
            .filter(|id| manager.model().node(*id).map(|n| n.is_dir()).unwrap_or(false))
            .collect();
        if frontier.is_empty() {
            break;
        }
    }

    println!("{}", style(&path).bold());
    print_children(manager.model(), start, 1, depth);
    Ok(())
}

fn print_children(model: &TreeModel, parent: NodeId, level: usize, depth: usize) {
    if level > depth {
        return;
    }
    for node in model
        .loaded_children(parent)
        .iter()
        .filter_map(|id| model.node(*id))
    {
        let indent = "  ".repeat(level);
        if node.is_dir() {
            println!("{}{}/", indent, style(node.display_name()).blue().bold());
            print_children(model, node.id(), level + 1, depth);
        } else {
            println!("{}{}", indent, node.display_name());
        }
    }
}

/// Rescan every base path, then drop rows of vanished files
pub async fn scan<S: MetadataStore>(manager: &mut LibraryManager<S>) -> Result<()> {
    let started = manager.scan_all();
    if started == 0 {
        println!("No library base paths. Use 'add' to register one.");
        return Ok(());
    }

    let reports = drain(manager).await?;
    print_imports(&reports);

    let pruned = manager
        .prune_missing_rows()
        .await
        .context("Failed to drop missing rows")?;
    if !pruned.is_empty() {
        println!(
            "{} Dropped {} rows of missing files",
            style("✓").green().bold(),
            pruned.len()
        );
    }
    Ok(())
}

/// List library rows
pub fn list_rows<S: MetadataStore>(manager: &LibraryManager<S>, matches: &ArgMatches) -> Result<()> {
    let filter = row_filter(matches)?;
    let rows = manager.rows(&filter).context("Failed to list rows")?;

    if rows.is_empty() {
        println!("No rows in library. Use 'add' to index a directory.");
        return Ok(());
    }

    let long = matches.get_flag("long");
    println!("\n{} Rows in Library", style(rows.len()).bold().cyan());
    println!("{}", "=".repeat(80));
    for row in &rows {
        print_row(row, long);
    }
    Ok(())
}

/// Rename an entry through the tree, keeping its row
pub async fn rename<S: MetadataStore>(
    manager: &mut LibraryManager<S>,
    matches: &ArgMatches,
) -> Result<()> {
    let path = resolve_path(required(matches, "path")?)?;
    let name = required(matches, "name")?;

    let current = manager
        .rename_path(&path, name)
        .await
        .with_context(|| format!("Failed to rename {}", path))?;
    drain(manager).await?;
    println!("{} Renamed {} to {}", style("✓").green().bold(), path, current);
    Ok(())
}

/// Drop rows whose files no longer exist
pub async fn sweep<S: MetadataStore>(manager: &mut LibraryManager<S>) -> Result<()> {
    let removed = manager
        .prune_missing_rows()
        .await
        .context("Failed to drop missing rows")?;
    if removed.is_empty() {
        println!("Every row still has its file.");
    } else {
        println!("{} Removed {} rows:", style("✓").green().bold(), removed.len());
        for row in &removed {
            println!("  {}", row.resource);
        }
    }
    Ok(())
}

/// Applies background work, reporting progress and failures as it goes
async fn drain<S: MetadataStore>(manager: &mut LibraryManager<S>) -> Result<Vec<ImportReport>> {
    let mut reports = Vec::new();
    while let Some(summary) = manager.process_next().await? {
        match summary {
            WorkSummary::ScanProgress { root, scanned } => {
                eprintln!("  {} {} entries", style(root).dim(), scanned);
            }
            WorkSummary::ListingFailed { error, .. } => {
                eprintln!("{} {}", style("!").yellow().bold(), error);
            }
            WorkSummary::Imported { report, .. } => reports.push(report),
            WorkSummary::TreeChanged { .. } | WorkSummary::Discarded => {}
        }
    }
    Ok(reports)
}

fn print_imports(reports: &[ImportReport]) {
    let added: usize = reports.iter().map(|r| r.added_count()).sum();
    let known: usize = reports.iter().map(|r| r.already_indexed).sum();
    println!(
        "{} Indexed {} new ebooks ({} already known)",
        style("✓").green().bold(),
        added,
        known
    );
    for (path, reason) in reports.iter().flat_map(|r| &r.failures) {
        println!("  {} {}: {}", style("✗").red(), path, reason);
    }
}

fn print_row(row: &LibraryRow, long: bool) {
    println!("\n{}", style(&row.title).bold());
    if !row.authors.is_empty() {
        println!("  by {}", row.authors.join(", "));
    }
    let format = row
        .format
        .map(|f| f.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("  {} | {} | {}", format, format_size(row.file_size), row.resource);
    if long {
        println!(
            "  ID: {} | Added: {}",
            truncate(&row.id.to_string(), 8),
            format_date(row.added.as_millis())
        );
    }
}

fn row_filter(matches: &ArgMatches) -> Result<RowFilter> {
    let mut filter = match matches.get_one::<String>("under") {
        Some(under) => RowFilter::within(resolve_path(under)?),
        None => RowFilter::all(),
    };
    if let Some(text) = matches.get_one::<String>("search") {
        filter = filter.with_text(text.as_str());
    }
    Ok(filter)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("{} is required", name))
}

/// Makes `raw` absolute against the working directory
fn resolve_path(raw: &str) -> Result<ResourcePath> {
    let absolute =
        std::path::absolute(raw).with_context(|| format!("Invalid path: {}", raw))?;
    Ok(ResourcePath::new(absolute))
}

fn format_date(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len])
    }
}

#[cfg(test)]
mod tests;
