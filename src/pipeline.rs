//! Stage runners.
//!
//! Stages run in a fixed order and hand data to each other only through the
//! files under the data directory:
//!
//! ```text
//! raw/*.txt ─truth→ truth/episodes/*.json ─merge→ truth/characters.json
//!   ─ids→ characters/identifiers.json ─meta→ truth/meta.json
//!   ─compile→ compile/*.json ─build→ build/
//! ```
//!
//! Per-episode work runs on the rayon pool. A bad episode is logged and
//! skipped; only a missing or unreadable shared table stops a stage.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use quote_types::EpisodeData;
use rayon::prelude::*;

use crate::assemble::{Assembler, CharacterDescriptions, EpisodeDescriptions, search_index};
use crate::check::{Finding, check_tables};
use crate::compile::{CompiledEpisode, Compiler};
use crate::config::Config;
use crate::error::Result;
use crate::fuzzy::close_matches;
use crate::identifier::{IdentifierTable, RebuildSummary};
use crate::mapping::{MappingEntry, MarkedCount, SpeakerCounts, SpeakerMapping, marked_merge};
use crate::meta::{MetaStore, MetaSummary};
use crate::parser::{Scene, parse_transcript};
use crate::report::BatchReport;
use crate::scanner::{EpisodeFile, scan_episodes};
use crate::store;

// ── Shared helpers ─────────────────────────────────────────────────

fn progress(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{msg:>10} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb
}

/// Run `f` over every file, in parallel when configured. Results keep file
/// order.
fn map_files<T, F>(files: &[EpisodeFile], parallel: bool, label: &str, f: F) -> BatchReport<T>
where
    T: Send,
    F: Fn(&EpisodeFile) -> Result<T> + Sync,
{
    let pb = progress(files.len(), label);
    let run = |file: &EpisodeFile| {
        let result = f(file).map_err(|e| e.in_episode(file.season, file.episode));
        pb.inc(1);
        result
    };
    let results: Vec<Result<T>> = if parallel {
        files.par_iter().map(run).collect()
    } else {
        files.iter().map(run).collect()
    };
    pb.finish_and_clear();

    let mut report = BatchReport::new();
    for (file, result) in files.iter().zip(results) {
        report.record(file.stem.clone(), result);
    }
    report
}

/// Curated tables, loaded once per run.
pub struct Tables {
    pub mapping: SpeakerMapping,
    pub identifiers: IdentifierTable,
    pub meta: MetaStore,
}

impl Tables {
    pub fn load(config: &Config) -> Result<Self> {
        let mapping = SpeakerMapping::load(&config.speaker_mapping)?.with_max_hops(config.max_alias_hops);
        let identifiers = IdentifierTable::load(&config.identifiers)?;
        let meta = MetaStore::load_optional(&config.meta)?.unwrap_or_else(|| {
            tracing::warn!("No classification table at {}; using identifier tags.", config.meta.display());
            MetaStore::new()
        });
        Ok(Self {
            mapping,
            identifiers,
            meta,
        })
    }
}

// ── truth ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruthSummary {
    pub parsed: usize,
    pub failed: usize,
    pub speakers: usize,
    /// Whether this run wrote the initial speaker mapping
    pub seeded_mapping: bool,
}

/// Parse every raw transcript into `truth/episodes/` and seed the speaker
/// mapping if it does not exist yet.
pub fn run_truth(config: &Config) -> Result<TruthSummary> {
    let files = scan_episodes(&config.raw_dir, "txt")?;
    tracing::info!("Parsing {} raw transcripts", files.len());

    let report = map_files(&files, config.parallel, "truth", |file| {
        parse_transcript(&store::read_text(&file.path)?)
    });

    let mut counts = SpeakerCounts::new();
    for (stem, scenes) in &report.succeeded {
        store::write_json(&config.episodes_dir.join(format!("{stem}.json")), scenes)?;
        counts.add_scenes(scenes);
    }
    // A failed transcript must not leave an earlier parse for compile to pick up
    for failure in &report.failed {
        store::remove_stale(&config.episodes_dir.join(format!("{}.json", failure.item)))?;
    }
    report.log_summary("truth");

    let seeded_mapping = if config.speaker_mapping.exists() {
        tracing::warn!(
            "Speaker mapping already exists at {}; not seeding.",
            config.speaker_mapping.display()
        );
        false
    } else {
        store::write_json(&config.speaker_mapping, &counts.seed_entries())?;
        tracing::info!("Seeded speaker mapping with {} speakers", counts.len());
        true
    };

    Ok(TruthSummary {
        parsed: report.succeeded.len(),
        failed: report.failed.len(),
        speakers: counts.len(),
        seeded_mapping,
    })
}

// ── merge ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub raw_speakers: usize,
    pub canonical: usize,
    pub unresolved: usize,
}

fn load_truth(config: &Config) -> Result<BatchReport<Vec<Scene>>> {
    let files = scan_episodes(&config.episodes_dir, "json")?;
    Ok(map_files(&files, config.parallel, "load", |file| store::read_json(&file.path)))
}

/// Resolve every observed speaker and write the canonical list.
pub fn run_merge(config: &Config) -> Result<MergeSummary> {
    let mapping = SpeakerMapping::load(&config.speaker_mapping)?.with_max_hops(config.max_alias_hops);
    let episodes = load_truth(config)?;

    let mut counts = SpeakerCounts::new();
    for scenes in episodes.values() {
        counts.add_scenes(scenes);
    }

    let (canonical, errors) = mapping.canonical_speakers(counts.speakers());
    for error in &errors {
        tracing::warn!("{error}");
    }
    store::write_json(&config.canonical_list, &canonical)?;
    tracing::info!(
        "{} raw speakers resolved to {} characters",
        counts.len() - errors.len(),
        canonical.len()
    );

    Ok(MergeSummary {
        raw_speakers: counts.len(),
        canonical: canonical.len(),
        unresolved: errors.len(),
    })
}

// ── ids / meta ─────────────────────────────────────────────────────

/// Rebuild the identifier table against the canonical list.
pub fn run_ids(config: &Config) -> Result<RebuildSummary> {
    let canonical: Vec<String> = store::read_json(&config.canonical_list)?;
    let prior = IdentifierTable::load_optional(&config.identifiers)?;

    let (table, summary) = IdentifierTable::rebuild(prior.as_ref(), &canonical);
    table.save(&config.identifiers)?;

    tracing::info!(
        "Identifiers: {} kept, {} new, {} unseen",
        summary.preserved,
        summary.added,
        summary.unseen
    );
    if summary.unseen > 0 {
        tracing::warn!("{} identifiers are flagged for review", summary.unseen);
    }
    Ok(summary)
}

/// Seed or update the classification table from the identifier table.
pub fn run_meta(config: &Config) -> Result<MetaSummary> {
    let identifiers = IdentifierTable::load(&config.identifiers)?;
    let mut meta = MetaStore::load_optional(&config.meta)?.unwrap_or_default();

    let summary = meta.update_from(&identifiers);
    meta.save(&config.meta)?;

    tracing::info!(
        "Meta: {} added, {} overwritten, {} preserved",
        summary.added,
        summary.overwritten,
        summary.preserved
    );
    Ok(summary)
}

/// Push curated classifications back into the identifier table. Returns
/// the number of character references still unclassified.
pub fn run_meta_update(config: &Config) -> Result<usize> {
    let meta = MetaStore::load(&config.meta)?;
    let mut identifiers = IdentifierTable::load(&config.identifiers)?;

    let remaining = meta.apply_to(&mut identifiers);
    identifiers.save(&config.identifiers)?;

    if remaining > 0 {
        tracing::warn!("{remaining} characters still have no classification.");
    }
    Ok(remaining)
}

// ── compile ────────────────────────────────────────────────────────

/// Compile every parsed episode into `compile/`.
pub fn run_compile(config: &Config) -> Result<BatchReport<()>> {
    let tables = Tables::load(config)?;
    let compiler = Compiler::new(&tables.mapping, &tables.identifiers, &tables.meta);
    let files = scan_episodes(&config.episodes_dir, "json")?;

    let report = map_files(&files, config.parallel, "compile", |file| {
        let scenes: Vec<Scene> = store::read_json(&file.path)?;
        let compiled = CompiledEpisode {
            season: file.season,
            episode: file.episode,
            scenes: compiler.compile_scenes(&scenes)?,
        };
        store::write_json(&file.sibling_in(&config.compile_dir, "json"), &compiled)
    });

    for failure in &report.failed {
        store::remove_stale(&config.compile_dir.join(format!("{}.json", failure.item)))?;
    }
    report.log_summary("compile");
    Ok(report)
}

// ── build ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Defaults to the configured build directory
    pub out: Option<PathBuf>,
    /// Also write the full nested dataset as `data.json`
    pub mega: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub episodes: usize,
    pub skipped: usize,
    pub characters: usize,
    pub quotes: usize,
    pub undescribed: Vec<String>,
}

fn episode_path(out: &Path, season: u32, episode: u32) -> PathBuf {
    out.join(format!("{season:02}")).join(format!("{episode:02}.json"))
}

/// Assemble compiled episodes into the presentation dataset.
pub fn run_build(config: &Config, options: &BuildOptions) -> Result<BuildSummary> {
    let episode_descriptions: EpisodeDescriptions = store::read_json(&config.episode_descriptions)?;
    let character_descriptions: CharacterDescriptions = store::read_json(&config.character_descriptions)?;
    let assembler = Assembler::new(&episode_descriptions, &character_descriptions);
    let out = options.out.as_deref().unwrap_or(config.build_dir.as_path());
    store::ensure_dir(out)?;

    let files = scan_episodes(&config.compile_dir, "json")?;
    let report = map_files(&files, config.parallel, "build", |file| {
        let compiled: CompiledEpisode = store::read_json(&file.path)?;
        assembler.episode(&compiled)
    });
    report.log_summary("build");

    let built: Vec<_> = report.values().cloned().collect();
    for data in &built {
        let path = episode_path(out, data.header.season_number, data.header.episode_number);
        store::write_json_compact(&path, data)?;
    }

    store::write_json_compact(&out.join("episodes.json"), &assembler.grid(&built, |e| e.header.clone()))?;

    let undescribed: Vec<String> = assembler.undescribed(&built).into_iter().collect();
    if !undescribed.is_empty() {
        tracing::warn!("No character description for: {}", undescribed.join(", "));
    }

    let rollups = assembler.rollups(&built);
    store::write_json_compact(&out.join("characters.json"), &rollups)?;
    for (id, rollup) in &rollups {
        store::write_json_compact(&out.join("character").join(format!("{id}.json")), rollup)?;
    }

    let search = search_index(&built);
    store::write_json_compact(&out.join("search.json"), &search)?;

    if options.mega {
        store::write_json_compact(&out.join("data.json"), &assembler.grid(&built, EpisodeData::clone))?;
        tracing::debug!("Mega data file written.");
    }

    tracing::info!(
        "Built {} episodes, {} characters, {} quotes into {}",
        built.len(),
        rollups.len(),
        search.len(),
        out.display()
    );

    Ok(BuildSummary {
        episodes: built.len(),
        skipped: report.failed.len(),
        characters: rollups.len(),
        quotes: search.len(),
        undescribed,
    })
}

// ── similar ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimilarOptions {
    pub text: String,
    /// Search destinations instead of sources
    pub destination: bool,
    /// `None` lists every match
    pub limit: Option<usize>,
    pub cutoff: Option<f64>,
    pub no_merge: bool,
    pub reversed: bool,
}

/// Ranked near matches from the speaker mapping, formatted for the console.
pub fn run_similar(config: &Config, options: &SimilarOptions) -> Result<Vec<String>> {
    let entries: Vec<MappingEntry> = store::read_json(&config.speaker_mapping)?;
    let names = entries.into_iter().map(|e| {
        let name = if options.destination { e.destination } else { e.source };
        (name, i64::try_from(e.count).unwrap_or(i64::MAX))
    });

    let names: Vec<(String, MarkedCount)> = if options.no_merge {
        names.map(|(n, c)| (n, MarkedCount(c))).collect()
    } else {
        marked_merge(names).into_iter().collect()
    };

    let cutoff = options.cutoff.unwrap_or(config.similarity_cutoff);
    let matches = close_matches(&options.text, names.iter().map(|(n, _)| n.as_str()), options.limit, cutoff);

    let mut lines: Vec<String> = matches
        .iter()
        .enumerate()
        .map(|(rank, m)| format!("{}. {} ({})", rank + 1, m.candidate, names[m.index].1))
        .collect();
    if options.reversed {
        lines.reverse();
    }
    Ok(lines)
}

// ── check / run-all ────────────────────────────────────────────────

/// Lint the curated tables and log every finding.
pub fn run_check(config: &Config) -> Result<Vec<Finding>> {
    let identifiers = IdentifierTable::load(&config.identifiers)?;
    let meta = MetaStore::load_optional(&config.meta)?;

    let findings = check_tables(&identifiers, meta.as_ref());
    for finding in &findings {
        tracing::warn!("{finding}");
    }
    if findings.is_empty() {
        tracing::info!("No problems found.");
    }
    Ok(findings)
}

/// Every stage in order.
pub fn run_all(config: &Config) -> Result<()> {
    tracing::debug!("Running `truth`");
    run_truth(config)?;
    tracing::debug!("Running `merge`");
    run_merge(config)?;
    tracing::debug!("Running `ids`");
    run_ids(config)?;
    tracing::debug!("Running `meta`");
    run_meta(config)?;
    tracing::debug!("Running `compile`");
    run_compile(config)?;
    tracing::debug!("Running `build`");
    run_build(config, &BuildOptions::default())?;
    Ok(())
}
