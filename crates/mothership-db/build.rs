//! Embeds `migrations/NNN_slug.{up,down}.sql` as the `MIGRATIONS` table.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

#[derive(Default)]
struct Pair {
    slug: String,
    up: Option<String>,
    down: Option<String>,
}

fn main() {
    let manifest = PathBuf::from(required_env("CARGO_MANIFEST_DIR"));
    let dir = manifest.join("migrations");
    println!("cargo:rerun-if-changed={}", dir.display());

    let pairs = collect(&dir);
    let source = render(&pairs);

    let out = PathBuf::from(required_env("OUT_DIR")).join("migrations.rs");
    if let Err(err) = fs::write(&out, source) {
        panic!("write {}: {err}", out.display());
    }
}

fn required_env(key: &str) -> String {
    match std::env::var(key) {
        Ok(value) => value,
        Err(err) => panic!("{key} not set: {err}"),
    }
}

fn collect(dir: &Path) -> BTreeMap<i32, Pair> {
    let mut pairs: BTreeMap<i32, Pair> = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => panic!("scan {}: {err}", dir.display()),
        };
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !entry.file_type().is_file() || !name.ends_with(".sql") {
            continue;
        }
        println!("cargo:rerun-if-changed={}", entry.path().display());

        let (version, slug, is_up) = match split_name(&name) {
            Some(parts) => parts,
            None => panic!("migration {name}: expected NNN_slug.up.sql or NNN_slug.down.sql"),
        };
        let pair = pairs.entry(version).or_default();
        if !pair.slug.is_empty() && pair.slug != slug {
            panic!("migration {version} has two names: {} and {slug}", pair.slug);
        }
        pair.slug = slug;
        if is_up {
            pair.up = Some(name);
        } else {
            pair.down = Some(name);
        }
    }
    pairs
}

/// `001_initial_schema.up.sql` -> `(1, "initial_schema", true)`.
fn split_name(name: &str) -> Option<(i32, String, bool)> {
    let (stem, is_up) = match name.strip_suffix(".up.sql") {
        Some(stem) => (stem, true),
        None => (name.strip_suffix(".down.sql")?, false),
    };
    let (number, slug) = stem.split_once('_')?;
    let version = number.parse().ok()?;
    if slug.is_empty() {
        return None;
    }
    Some((version, slug.to_string(), is_up))
}

fn render(pairs: &BTreeMap<i32, Pair>) -> String {
    let mut source = String::from("pub static MIGRATIONS: &[EmbeddedMigration] = &[\n");
    for (version, pair) in pairs {
        let (Some(up), Some(down)) = (&pair.up, &pair.down) else {
            panic!("migration {version} ({}) needs both up and down files", pair.slug);
        };
        let _ = writeln!(
            source,
            "    EmbeddedMigration {{ version: {version}, description: {:?}, up_sql: {}, down_sql: {} }},",
            pair.slug,
            embed(up),
            embed(down),
        );
    }
    source.push_str("];\n");
    source
}

fn embed(file: &str) -> String {
    let rel = format!("/migrations/{file}");
    format!("include_str!(concat!(env!(\"CARGO_MANIFEST_DIR\"), {rel:?}))")
}
