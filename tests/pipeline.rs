use std::fs;
use std::path::Path;

use quote_normalize::Config;
use quote_normalize::mapping::MappingEntry;
use quote_normalize::pipeline::{self, BuildOptions, SimilarOptions};
use quote_types::EpisodeData;
use serde_json::{Value, json};

const EPISODE_ONE: &str = "\
Michael|All right Jim. Your quarterlies look very good.
Jim|Oh, I told you. I couldn't close it.
-
!1
Micheal|Cut this.
Jim and Pam|Hey.
";

const EPISODE_TWO: &str = "\
Dwight|Bears. Beets.
-
!newpeat
Michael|Again.
";

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read_value(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn seed_data_dir(root: &Path) {
    write(&root.join("raw/1-01.txt"), EPISODE_ONE);
    write(&root.join("raw/1-02.txt"), EPISODE_TWO);
    write(&root.join("raw/1-03.txt"), "Jim|Fine.\nJ|Too short.\n");
    write(
        &root.join("episode_descriptions.json"),
        &json!([[
            {"title": "Pilot", "description": "A documentary crew arrives."},
            {"title": "Diversity Day", "description": "A consultant visits."},
            {"title": "Health Care", "description": "Dwight picks a plan."}
        ]])
        .to_string(),
    );
    write(
        &root.join("character_descriptions.json"),
        &json!({
            "michael": {"name": "Michael Scott", "actor": "Steve Carell"},
            "jim": {"name": "Jim Halpert"},
            "pam": {"name": "Pam Beesly"},
            "dwight": {"name": "Dwight Schrute"}
        })
        .to_string(),
    );
}

#[test]
fn test_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    seed_data_dir(root);
    let config = Config::load(root).unwrap();

    // truth: the malformed transcript is skipped, the rest seed the mapping
    let truth = pipeline::run_truth(&config).unwrap();
    assert_eq!(truth.parsed, 2);
    assert_eq!(truth.failed, 1);
    assert!(truth.seeded_mapping);
    assert!(root.join("truth/episodes/1-01.json").exists());
    assert!(!root.join("truth/episodes/1-03.json").exists());

    let seeded: Vec<MappingEntry> =
        serde_json::from_value(read_value(&config.speaker_mapping)).unwrap();
    assert_eq!(seeded[0].source, "Michael");
    assert_eq!(seeded[0].count, 2);

    // A second truth run never overwrites the curated mapping
    assert!(!pipeline::run_truth(&config).unwrap().seeded_mapping);

    // Curate: fold the typo into its canonical spelling
    let curated: Vec<MappingEntry> = seeded
        .into_iter()
        .map(|mut e| {
            if e.source == "Micheal" {
                e.destination = "Michael".into();
            }
            e
        })
        .collect();
    fs::write(&config.speaker_mapping, serde_json::to_string_pretty(&curated).unwrap()).unwrap();

    let merge = pipeline::run_merge(&config).unwrap();
    assert_eq!(merge.unresolved, 0);
    assert_eq!(
        read_value(&config.canonical_list),
        json!(["Michael", "Jim", "Jim and Pam", "Dwight"])
    );

    let ids = pipeline::run_ids(&config).unwrap();
    assert_eq!(ids.added, 4);
    let first_ids = fs::read_to_string(&config.identifiers).unwrap();
    let again = pipeline::run_ids(&config).unwrap();
    assert_eq!(again.added, 0);
    assert_eq!(fs::read_to_string(&config.identifiers).unwrap(), first_ids);

    let meta = pipeline::run_meta(&config).unwrap();
    assert_eq!(meta.added, 4);
    fs::write(
        &config.meta,
        json!({"michael": "main", "jim": "main", "pam": "main", "dwight": "recurring"}).to_string(),
    )
    .unwrap();
    assert_eq!(pipeline::run_meta_update(&config).unwrap(), 0);
    assert!(pipeline::run_check(&config).unwrap().is_empty());

    let compiled = pipeline::run_compile(&config).unwrap();
    assert!(compiled.is_clean());
    assert_eq!(compiled.total(), 2);

    let build = pipeline::run_build(
        &config,
        &BuildOptions {
            out: None,
            mega: true,
        },
    )
    .unwrap();
    assert_eq!(build.episodes, 2);
    assert_eq!(build.quotes, 6);
    assert!(build.undescribed.is_empty());

    // Typed read: the character map keeps its on-disk order
    let header: EpisodeData = serde_json::from_str(
        &fs::read_to_string(root.join("build/01/01.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(header.header.title, "Pilot");
    assert_eq!(header.header.season_number, 1);
    let order: Vec<&str> = header.header.characters.keys().map(String::as_str).collect();
    assert_eq!(order, vec!["michael", "jim", "pam"]);
    assert_eq!(header.header.characters["michael"].appearances, 2);

    let pilot = read_value(&root.join("build/01/01.json"));

    let cut = &pilot["scenes"][1]["quotes"];
    assert_eq!(cut[0]["speaker"], "Michael");
    assert_eq!(cut[0]["deleted"], 1);
    assert_eq!(cut[1]["speaker"], "{jim} and {pam}");
    assert_eq!(cut[1]["isAnnotated"], true);
    assert_eq!(cut[1]["characters"]["pam"], "Pam");

    let grid = read_value(&root.join("build/episodes.json"));
    assert_eq!(grid[0][1]["title"], "Diversity Day");
    assert!(grid[0][2].is_null());
    assert!(grid[0][0].get("scenes").is_none());

    let characters = read_value(&root.join("build/characters.json"));
    assert_eq!(characters["michael"]["appearances"], 3);
    assert_eq!(characters["michael"]["actor"], "Steve Carell");
    assert!(root.join("build/character/dwight.json").exists());

    let search = read_value(&root.join("build/search.json"));
    assert_eq!(search.as_array().unwrap().len(), 6);
    assert_eq!(search[5]["position"], 5);
    assert_eq!(search[5]["newpeat"], true);

    assert!(root.join("build/data.json").exists());
}

#[test]
fn test_similar_lists_marked_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::with_defaults(dir.path());
    write(
        &config.speaker_mapping,
        &json!([
            {"source": "Michael", "destination": "Michael", "count": 40},
            {"source": "Micheal", "destination": "Michael", "count": 2},
            {"source": "Michael", "destination": "Michael", "count": 3},
            {"source": "Dwight", "destination": "Dwight", "count": 30}
        ])
        .to_string(),
    );

    let mut options = SimilarOptions {
        text: "Michael".into(),
        destination: false,
        limit: None,
        cutoff: None,
        no_merge: false,
        reversed: false,
    };
    let lines = pipeline::run_similar(&config, &options).unwrap();
    assert_eq!(lines, vec!["1. Michael (43*)", "2. Micheal (2)"]);

    options.no_merge = true;
    options.reversed = true;
    let lines = pipeline::run_similar(&config, &options).unwrap();
    assert_eq!(lines, vec!["3. Micheal (2)", "2. Michael (3)", "1. Michael (40)"]);
}

#[test]
fn test_unmapped_speaker_fails_only_its_episode() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    seed_data_dir(root);
    let config = Config::load(root).unwrap();

    pipeline::run_truth(&config).unwrap();
    pipeline::run_merge(&config).unwrap();
    pipeline::run_ids(&config).unwrap();
    pipeline::run_meta(&config).unwrap();
    assert!(pipeline::run_compile(&config).unwrap().is_clean());
    assert!(root.join("compile/1-02.json").exists());

    // Drop Dwight from the curated mapping: episode 2 can no longer compile
    let entries: Vec<MappingEntry> = serde_json::from_value(read_value(&config.speaker_mapping)).unwrap();
    let kept: Vec<MappingEntry> = entries.into_iter().filter(|e| e.source != "Dwight").collect();
    fs::write(&config.speaker_mapping, serde_json::to_string(&kept).unwrap()).unwrap();

    let report = pipeline::run_compile(&config).unwrap();
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed[0].item, "1-02");
    assert!(report.failed[0].error.is_resolution());
    assert!(root.join("compile/1-01.json").exists());
    assert!(!root.join("compile/1-02.json").exists());
}

#[test]
fn test_failed_rerun_removes_stale_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    seed_data_dir(root);
    let config = Config::load(root).unwrap();

    pipeline::run_truth(&config).unwrap();
    pipeline::run_merge(&config).unwrap();
    pipeline::run_ids(&config).unwrap();
    pipeline::run_meta(&config).unwrap();
    assert_eq!(pipeline::run_compile(&config).unwrap().total(), 2);
    assert!(root.join("compile/1-02.json").exists());

    // Episode 2 breaks; its earlier parse and compile output must not survive
    write(&root.join("raw/1-02.txt"), "X|bad\n");
    let truth = pipeline::run_truth(&config).unwrap();
    assert_eq!(truth.failed, 2);
    assert!(!root.join("truth/episodes/1-02.json").exists());

    let report = pipeline::run_compile(&config).unwrap();
    assert_eq!(report.total(), 1);
    assert!(root.join("compile/1-01.json").exists());
    assert!(!root.join("compile/1-02.json").exists());

    let build = pipeline::run_build(
        &config,
        &BuildOptions {
            out: None,
            mega: false,
        },
    )
    .unwrap();
    assert_eq!(build.episodes, 1);
    assert!(!root.join("build/01/02.json").exists());
}
