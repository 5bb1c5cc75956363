use super::*;
use folio_config::ConfigManager;
use folio_library::JsonFileStore;
use std::fs;
use tempfile::TempDir;

struct Setup {
    books: TempDir,
    _config_dir: TempDir,
    manager: LibraryManager<JsonFileStore>,
}

fn setup() -> Result<Setup> {
    let books = TempDir::new()?;
    fs::write(books.path().join("Mary Shelley - Frankenstein.epub"), b"PK\x03\x04")?;
    fs::create_dir(books.path().join("poetry"))?;
    fs::write(books.path().join("poetry").join("Odes.pdf"), b"%PDF-1.5")?;

    let config_dir = TempDir::new()?;
    let manager = LibraryManager::open(ConfigManager::with_directory(
        config_dir.path().to_path_buf(),
    )?)?;
    Ok(Setup {
        books,
        _config_dir: config_dir,
        manager,
    })
}

fn args(argv: &[&str]) -> Result<ArgMatches> {
    let matches = crate::build_cli().try_get_matches_from(argv)?;
    let (_, sub) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("no subcommand"))?;
    Ok(sub.clone())
}

fn path_arg(dir: &std::path::Path) -> Result<String> {
    dir.to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("non UTF-8 temp path"))
}

#[tokio::test]
async fn test_add_list_and_remove() -> Result<()> {
    let mut setup = setup()?;
    let books = path_arg(setup.books.path())?;

    add_base_path(&mut setup.manager, &args(&["folio", "add", &books])?).await?;
    assert_eq!(setup.manager.store().len()?, 2);

    let matches = args(&["folio", "list", "--search", "shelley"])?;
    assert_eq!(setup.manager.rows(&row_filter(&matches)?)?.len(), 1);
    list_rows(&setup.manager, &matches)?;

    remove_base_path(&mut setup.manager, &args(&["folio", "remove", &books])?)?;
    assert!(setup.manager.store().is_empty()?);
    assert!(setup.manager.config().library.base_paths.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rename_keeps_row() -> Result<()> {
    let mut setup = setup()?;
    let books = path_arg(setup.books.path())?;
    add_base_path(&mut setup.manager, &args(&["folio", "add", &books])?).await?;

    let old = setup.books.path().join("poetry").join("Odes.pdf");
    let before = setup
        .manager
        .store()
        .get_row(&ResourcePath::new(&old))?
        .ok_or_else(|| anyhow!("row missing"))?;

    rename(
        &mut setup.manager,
        &args(&["folio", "rename", &path_arg(&old)?, "Keats - Odes.pdf"])?,
    )
    .await?;

    let after = setup
        .manager
        .store()
        .get_row_by_id(before.id)?
        .ok_or_else(|| anyhow!("row lost"))?;
    assert_eq!(after.display_name, "Keats - Odes.pdf");
    assert!(setup.books.path().join("poetry").join("Keats - Odes.pdf").exists());
    Ok(())
}

#[tokio::test]
async fn test_tree_and_sweep() -> Result<()> {
    let mut setup = setup()?;
    let books = path_arg(setup.books.path())?;
    add_base_path(&mut setup.manager, &args(&["folio", "add", &books])?).await?;

    show_tree(&mut setup.manager, &args(&["folio", "tree", &books, "--depth", "2"])?).await?;
    let poetry = ResourcePath::new(setup.books.path().join("poetry"));
    let node = setup
        .manager
        .model()
        .find(&poetry)
        .ok_or_else(|| anyhow!("poetry not listed"))?;
    assert_eq!(setup.manager.model().loaded_children(node).len(), 1);

    fs::remove_file(setup.books.path().join("Mary Shelley - Frankenstein.epub"))?;
    sweep(&mut setup.manager).await?;
    assert_eq!(setup.manager.store().len()?, 1);
    Ok(())
}

#[test]
fn test_cli_rejects_missing_arguments() {
    assert!(crate::build_cli()
        .try_get_matches_from(["folio", "rename", "/only/one"])
        .is_err());
    assert!(crate::build_cli()
        .try_get_matches_from(["folio", "tree", "/lib", "--depth", "two"])
        .is_err());
}

#[test]
fn test_resolve_path_is_absolute() -> Result<()> {
    let path = resolve_path("some/../books")?;
    assert!(path.as_path().is_absolute());
    assert!(path.as_str().ends_with("books"));
    assert!(!path.as_str().contains(".."));
    Ok(())
}

#[test]
fn test_format_size() {
    assert_eq!(format_size(512), "512 bytes");
    assert_eq!(format_size(1024), "1.00 KB");
    assert_eq!(format_size(1_048_576), "1.00 MB");
    assert_eq!(format_size(1_073_741_824), "1.00 GB");
}

#[test]
fn test_format_date() {
    assert_eq!(format_date(0), "1970-01-01");
    assert_eq!(format_date(1_700_000_000_000), "2023-11-14");
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("12345678", 8), "12345678");
    assert_eq!(truncate("123456789", 8), "12345678...");
}
