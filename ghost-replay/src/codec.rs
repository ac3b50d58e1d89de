//! Replay and track files
//!
//! Replays are JSON documents (`*.json`), or zstd-compressed JSON
//! (`*.json.zst`) when file size matters. Each replay has a small `.meta`
//! sidecar with its identity and first/last node so listings don't need
//! to parse every node. Nodes written by early versions stored position and
//! rotation as flat `PX`..`RZ` fields; those are still read.

use anyhow::{bail, Context, Result};
use ghost_core::model::{Node, RunMeta, Vector3};
use ghost_core::run::Run;
use ghost_core::series::NodeSeries;
use ghost_core::track::Track;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub const JSON_SUFFIX: &str = ".json";
pub const COMPRESSED_SUFFIX: &str = ".json.zst";
pub const META_SUFFIX: &str = ".meta";

const ILLEGAL_CHARS: &[char] = &['\\', '/', ':', '?', '"', '<', '>', '|'];
const ZSTD_LEVEL: i32 = 3;

/// Replace characters that are not allowed in file names with `.`
pub fn strip_name(name: &str) -> String {
    name.chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '.' } else { c })
        .collect()
}

/// Replay file contents with nodes still undecoded
#[derive(Debug, Deserialize)]
pub struct RawReplay {
    #[serde(flatten)]
    pub meta: RunMeta,

    #[serde(rename = "Nodes", default)]
    pub nodes: Vec<Value>,
}

#[derive(Serialize)]
struct ReplayFileRef<'a> {
    #[serde(flatten)]
    meta: &'a RunMeta,

    #[serde(rename = "Nodes")]
    nodes: &'a [Node],
}

/// Node identity stored in the sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdNode {
    #[serde(rename = "T")]
    pub timestamp: f64,
    #[serde(rename = "Pos")]
    pub position: Vector3,
}

/// Sidecar summary of a replay file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMeta {
    #[serde(rename = "Timestamp", default)]
    pub timestamp: u64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Track")]
    pub track: String,
    #[serde(rename = "VehicleModel")]
    pub vehicle_model: u32,
    /// First and last node
    #[serde(rename = "IdNodes", default)]
    pub id_nodes: Vec<IdNode>,
}

impl ReplayMeta {
    pub fn from_run(meta: &RunMeta, nodes: &NodeSeries) -> Self {
        let id_nodes = [nodes.first(), nodes.last()]
            .into_iter()
            .flatten()
            .map(|n| IdNode {
                timestamp: n.timestamp,
                position: n.position,
            })
            .collect();
        Self {
            timestamp: meta.timestamp,
            name: meta.name.clone(),
            track: meta.track.clone(),
            vehicle_model: meta.vehicle_model,
            id_nodes,
        }
    }

    pub fn lap_time(&self) -> Option<f64> {
        self.id_nodes.last().map(|n| n.timestamp)
    }
}

pub fn is_replay_file(path: &Path) -> bool {
    replay_stem(path).is_some()
}

fn is_compressed(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(COMPRESSED_SUFFIX))
}

/// File name without the replay suffix
fn replay_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(COMPRESSED_SUFFIX)
        .or_else(|| name.strip_suffix(JSON_SUFFIX))
        .filter(|stem| !stem.is_empty())
}

/// Sidecar location for a replay file
pub fn meta_path(replay: &Path) -> PathBuf {
    let stem = replay_stem(replay).unwrap_or("replay");
    replay.with_file_name(format!("{}{}", stem, META_SUFFIX))
}

/// Claim the first free `<name>[_n]` in `dir` by creating it.
///
/// A stem counts as taken when a replay with either suffix exists. The
/// file is created with `create_new`, so concurrent writers never get the
/// same path.
pub fn claim_path(dir: &Path, name: &str, compressed: bool) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let clean = strip_name(name);
    let (suffix, other) = if compressed {
        (COMPRESSED_SUFFIX, JSON_SUFFIX)
    } else {
        (JSON_SUFFIX, COMPRESSED_SUFFIX)
    };

    let mut stem = clean.clone();
    let mut count = 0u32;
    loop {
        if !dir.join(format!("{}{}", stem, other)).exists() {
            let path = dir.join(format!("{}{}", stem, suffix));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create {}", path.display()))
                }
            }
        }
        stem = format!("{}_{}", clean, count);
        count += 1;
    }
}

/// Replay files in `dir`, sorted by path
pub fn list_replays(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_replay_file(path))
        .collect();
    paths.sort();
    Ok(paths)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if is_compressed(path) {
        zstd::decode_all(bytes.as_slice())
            .with_context(|| format!("Failed to decompress {}", path.display()))
    } else {
        Ok(bytes)
    }
}

/// Parse a replay file, leaving nodes undecoded
pub fn read_raw(path: &Path) -> Result<RawReplay> {
    let bytes = read_bytes(path)?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

fn take_vector(map: &mut Map<String, Value>, keys: [&str; 3]) -> Value {
    let [x, y, z] = keys.map(|k| map.remove(k).unwrap_or(Value::Null));
    let mut vector = Map::new();
    vector.insert("X".to_string(), x);
    vector.insert("Y".to_string(), y);
    vector.insert("Z".to_string(), z);
    Value::Object(vector)
}

/// Decode one node, accepting the flat legacy layout.
pub fn decode_node(mut value: Value) -> Result<Node> {
    if let Value::Object(map) = &mut value {
        if map.contains_key("PX") && !map.contains_key("Pos") {
            let pos = take_vector(map, ["PX", "PY", "PZ"]);
            let rot = take_vector(map, ["RX", "RY", "RZ"]);
            map.insert("Pos".to_string(), pos);
            map.insert("Rot".to_string(), rot);
        }
    }
    serde_json::from_value(value).context("Invalid node")
}

/// Read a replay file into a complete run.
pub fn read_run(path: &Path) -> Result<Run> {
    let raw = read_raw(path)?;
    let nodes = raw
        .nodes
        .into_iter()
        .enumerate()
        .map(|(i, v)| decode_node(v).with_context(|| format!("Node {} of {}", i, path.display())))
        .collect::<Result<Vec<_>>>()?;
    let series = NodeSeries::from_nodes(nodes)
        .with_context(|| format!("Invalid node order in {}", path.display()))?;
    debug!("[Replay] Parsed {}", path.display());
    Ok(Run::loaded(raw.meta, series))
}

fn write_to(path: &Path, run: &Run, nodes: &NodeSeries, compressed: bool) -> Result<()> {
    let file = ReplayFileRef {
        meta: &run.meta,
        nodes: nodes.nodes(),
    };
    let bytes = if compressed {
        let json = serde_json::to_vec(&file)?;
        zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?
    } else {
        serde_json::to_vec_pretty(&file)?
    };
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("[Replay] Written {}", path.display());

    write_meta(path, &ReplayMeta::from_run(&run.meta, nodes), !compressed)?;
    Ok(())
}

/// Write into a claimed path, releasing it again on failure.
fn write_claimed(path: &Path, run: &Run, nodes: &NodeSeries, compressed: bool) -> Result<()> {
    let result = write_to(path, run, nodes, compressed);
    if result.is_err() {
        if let Err(e) = fs::remove_file(path) {
            warn!("[Replay] Failed to clean up {}: {}", path.display(), e);
        }
    }
    result
}

fn writable_nodes(run: &Run) -> Result<Arc<NodeSeries>> {
    let nodes = run.nodes();
    if nodes.is_empty() {
        bail!("Run {} has no nodes", run.meta.name);
    }
    Ok(nodes)
}

/// Write a run and its sidecar into `dir` under a fresh file name.
pub fn write_run(dir: &Path, run: &Run, compressed: bool) -> Result<PathBuf> {
    let nodes = writable_nodes(run)?;
    let path = claim_path(dir, &run.meta.name, compressed)?;
    write_claimed(&path, run, &nodes, compressed)?;
    Ok(path)
}

/// Write a run on a background thread. Write failures are logged, not
/// returned.
///
/// The file name is claimed before the thread starts, so back-to-back
/// saves of the same run name get distinct files.
pub fn write_async(
    dir: &Path,
    run: Arc<Run>,
    compressed: bool,
) -> Result<JoinHandle<Option<PathBuf>>> {
    let nodes = writable_nodes(&run)?;
    let path = claim_path(dir, &run.meta.name, compressed)?;
    Ok(thread::spawn(
        move || match write_claimed(&path, &run, &nodes, compressed) {
            Ok(()) => Some(path),
            Err(e) => {
                error!("[Replay] Failed to write {}: {:#}", path.display(), e);
                None
            }
        },
    ))
}

fn write_meta(replay: &Path, meta: &ReplayMeta, pretty: bool) -> Result<PathBuf> {
    let path = meta_path(replay);
    let bytes = if pretty {
        serde_json::to_vec_pretty(meta)?
    } else {
        serde_json::to_vec(meta)?
    };
    fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("[Meta] Written {}", path.display());
    Ok(path)
}

/// Read a replay's sidecar, regenerating it from the replay when missing.
pub fn read_meta(replay: &Path) -> Result<ReplayMeta> {
    let path = meta_path(replay);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(
                "[Meta] Missing {}, generating it from the replay",
                path.display()
            );
            let run = read_run(replay)?;
            let meta = ReplayMeta::from_run(&run.meta, &run.nodes());
            write_meta(replay, &meta, !is_compressed(replay))?;
            Ok(meta)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to open {}", path.display())),
    }
}

/// Delete a replay file and its sidecar.
pub fn delete_replay(replay: &Path) -> Result<()> {
    fs::remove_file(replay).with_context(|| format!("Failed to delete {}", replay.display()))?;
    match fs::remove_file(meta_path(replay)) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            warn!("[Meta] Failed to delete sidecar of {}: {}", replay.display(), e);
        }
        _ => {}
    }
    Ok(())
}

pub fn read_track(path: &Path) -> Result<Track> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_track(dir: &Path, track: &Track) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}{}", strip_name(&track.name), JSON_SUFFIX));
    fs::write(&path, serde_json::to_vec_pretty(track)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("[Track] Written {}", path.display());
    Ok(path)
}

/// Load every track in `dir`, skipping unreadable files.
pub fn load_tracks(dir: &Path) -> Result<Vec<Track>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;
    let mut tracks = Vec::new();
    for path in entries.filter_map(|e| e.ok().map(|e| e.path())) {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_track(&path) {
            Ok(track) => tracks.push(track),
            Err(e) => warn!("[Track] Skipping {}: {:#}", path.display(), e),
        }
    }
    tracks.sort_by(|a, b| a.name.cmp(&b.name));
    info!("[Track] Loaded {} tracks", tracks.len());
    Ok(tracks)
}
