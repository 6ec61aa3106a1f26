//! Multi-modal record assembly.
//!
//! [`SvsDataset`] owns one adapter per declared modality. Fetching a record
//! samples one augmentation, queries every modality with it, runs the
//! injected preprocessing, aligns the time axes, optionally masks and crops,
//! and casts to the configured precisions.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::adapter::Adapter;
use crate::cache::{self, RecordCache};
use crate::config::{CacheMode, DatasetConfig};
use crate::error::{DatasetError, ErrorCode, Result};
use crate::loader::{build_adapter, resolve, Augment, BuildContext, LoaderKind, Query};
use crate::sampler::AugmentSampler;
use crate::types::{Array, Field, FieldMap, Record, Value, PITCH_AUG_KEY, TIME_AUG_KEY};

/// One declared modality: where its index lives, its name in records, and
/// its loader type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalitySpec {
    pub path: PathBuf,
    pub name: String,
    pub loader_type: String,
}

impl ModalitySpec {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, loader_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            loader_type: loader_type.into(),
        }
    }

    /// Parses `path,name,loader_type`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [path, name, loader_type] if !path.is_empty() && !name.is_empty() => {
                Ok(Self::new(*path, *name, *loader_type))
            }
            _ => Err(DatasetError::invalid_config(format!(
                "expected path,name,loader_type: got {:?}",
                s
            ))),
        }
    }
}

/// Record transformation applied between loading and alignment.
///
/// Receives the raw fields of one utterance and the realized time factor, and
/// must return a map with exactly the same keys.
pub trait Preprocessor: Send + Sync {
    fn process(&self, id: &str, fields: FieldMap, time_factor: f64) -> Result<FieldMap>;

    /// Name shown in the dataset's `Display` output.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<F> Preprocessor for F
where
    F: Fn(&str, FieldMap, f64) -> Result<FieldMap> + Send + Sync,
{
    fn process(&self, id: &str, fields: FieldMap, time_factor: f64) -> Result<FieldMap> {
        self(id, fields, time_factor)
    }
}

/// Key of a record lookup: an utterance id or an ordinal index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Id(String),
    Index(usize),
}

impl From<&str> for RecordKey {
    fn from(id: &str) -> Self {
        RecordKey::Id(id.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(id: String) -> Self {
        RecordKey::Id(id)
    }
}

impl From<&String> for RecordKey {
    fn from(id: &String) -> Self {
        RecordKey::Id(id.clone())
    }
}

impl From<usize> for RecordKey {
    fn from(index: usize) -> Self {
        RecordKey::Index(index)
    }
}

struct Modality {
    spec: ModalitySpec,
    /// None for injected adapters whose type tag is not registered.
    kind: Option<LoaderKind>,
    adapter: Box<dyn Adapter>,
}

impl Modality {
    /// Query for this modality given the record's augmentation. MIDI keeps
    /// its duration: only the pitch shift is forwarded.
    fn query<'a>(&self, id: &'a str, augment: Augment) -> Query<'a> {
        if !self.adapter.is_augmentable() {
            return Query::plain(id);
        }
        match self.kind {
            Some(LoaderKind::Midi) => Query::augmented(id, Augment::new(augment.pitch_shift, 1.0)),
            _ => Query::augmented(id, augment),
        }
    }

    fn load(&self, query: &Query<'_>) -> Result<Value> {
        self.adapter.get(query).map_err(|e| {
            tracing::error!(
                path = %self.spec.path.display(),
                loader_type = %self.spec.loader_type,
                id = query.id,
                error = %e,
                "failed to load modality"
            );
            e
        })
    }
}

/// Multi-modal singing-voice dataset.
pub struct SvsDataset {
    modalities: Vec<Modality>,
    preprocess: Option<Box<dyn Preprocessor>>,
    config: DatasetConfig,
    sampler: AugmentSampler,
    /// Modality providing the note sequence for pitch-mean targeting.
    note_source: Option<usize>,
    cache: Option<Box<dyn RecordCache>>,
    /// Prefix of every cache key, naming what this dataset's records hold.
    scope: String,
    /// Seeds a fresh generator per call of [`SvsDataset::get_record`].
    rng: Mutex<ChaCha8Rng>,
}

impl SvsDataset {
    /// Builds every declared modality from its index file.
    pub fn new(
        modalities: Vec<ModalitySpec>,
        preprocess: Option<Box<dyn Preprocessor>>,
        config: &DatasetConfig,
    ) -> Result<Self> {
        check_config(config)?;
        check_names(modalities.iter().map(|m| m.name.as_str()))?;

        let ctx = BuildContext::from_config(config);
        let mut built = Vec::with_capacity(modalities.len());
        for spec in modalities {
            let adapter = build_adapter(&spec.path, &spec.loader_type, &ctx)?;
            built.push((spec, adapter));
        }
        Self::from_adapters(built, preprocess, config)
    }

    /// Builds a dataset over already constructed adapters.
    ///
    /// The loader type of each declaration is only used for display and to find the
    /// MIDI modality; it need not be registered.
    pub fn from_adapters(
        modalities: Vec<(ModalitySpec, Box<dyn Adapter>)>,
        preprocess: Option<Box<dyn Preprocessor>>,
        config: &DatasetConfig,
    ) -> Result<Self> {
        check_config(config)?;
        check_names(modalities.iter().map(|(spec, _)| spec.name.as_str()))?;

        let modalities: Vec<Modality> = modalities
            .into_iter()
            .map(|(spec, adapter)| {
                if adapter.is_empty() {
                    return Err(DatasetError::empty_index(spec.path.display()));
                }
                Ok(Modality {
                    kind: resolve(&spec.loader_type).ok(),
                    spec,
                    adapter,
                })
            })
            .collect::<Result<_>>()?;

        let note_source = modalities
            .iter()
            .position(|m| m.kind == Some(LoaderKind::Midi));
        if config.pitch_mean.is_enabled() && note_source.is_none() {
            return Err(DatasetError::invalid_config(
                "pitch_mean requires a modality with the midi loader type",
            ));
        }

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let scope = record_scope(&modalities, preprocess.as_deref(), config)?;
        tracing::debug!(scope = %scope, "dataset cache scope");

        Ok(Self {
            modalities,
            preprocess,
            config: config.clone(),
            sampler: AugmentSampler::from_config(config),
            note_source,
            cache: cache::from_config(config)?,
            scope,
            rng: Mutex::new(rng),
        })
    }

    /// Replaces the configured record cache.
    pub fn with_cache(mut self, cache: Box<dyn RecordCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Number of utterances, taken from the first declared modality.
    pub fn len(&self) -> usize {
        self.first().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.modalities.iter().any(|m| m.spec.name == name)
    }

    /// Modality names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.modalities.iter().map(|m| m.spec.name.as_str()).collect()
    }

    /// Utterance ids in the first modality's index order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.first().keys().iter().map(String::as_str)
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&dyn RecordCache> {
        self.cache.as_deref()
    }

    /// Key of `id` in the record cache.
    ///
    /// Datasets that differ in their declarations or in any setting that
    /// changes record contents never share keys, even over one directory.
    pub fn cache_key(&self, id: &str) -> String {
        format!("{}/{}", self.scope, id)
    }

    fn first(&self) -> &dyn Adapter {
        self.modalities[0].adapter.as_ref()
    }

    /// Fetches one record, drawing augmentation from the dataset's generator.
    pub fn get_record(&self, key: impl Into<RecordKey>) -> Result<(String, Arc<Record>)> {
        let seed = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| DatasetError::new(ErrorCode::IoFailed, "dataset generator lock poisoned"))?;
            rng.gen::<u64>()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.get_record_with_rng(key, &mut rng)
    }

    /// Fetches one record, drawing augmentation, mask and crop from `rng`.
    pub fn get_record_with_rng<R: Rng + ?Sized>(
        &self,
        key: impl Into<RecordKey>,
        rng: &mut R,
    ) -> Result<(String, Arc<Record>)> {
        let id = match key.into() {
            RecordKey::Id(id) => id,
            RecordKey::Index(index) => self
                .first()
                .keys()
                .get(index)
                .cloned()
                .ok_or_else(|| DatasetError::index_out_of_range(index, self.len()))?,
        };

        if let Some(cache) = &self.cache {
            if let Some(record) = cache.get(&self.cache_key(&id))? {
                return Ok((id, record));
            }
        }

        let note_mean = match self.note_source {
            Some(i) if self.sampler.needs_note_mean() => Some(self.note_mean(i, &id)?),
            _ => None,
        };
        let augment = self.sampler.sample(&id, note_mean, rng)?;

        let mut fields = FieldMap::new();
        for modality in &self.modalities {
            let value = modality.load(&modality.query(&id, augment))?;
            fields.insert(modality.spec.name.clone(), Field::from(value));
        }

        if let Some(preprocess) = &self.preprocess {
            fields = run_preprocess(preprocess.as_ref(), &id, fields, augment.time_factor)?;
        }

        self.align(&mut fields, rng);

        fields.insert(
            PITCH_AUG_KEY.to_string(),
            Field::Array(Array::from_i64(vec![augment.pitch_shift as i64])),
        );
        fields.insert(
            TIME_AUG_KEY.to_string(),
            Field::Array(Array::from_f64(vec![augment.time_factor])),
        );

        let mut cast = FieldMap::new();
        for (name, field) in fields {
            let field = field
                .cast(&name, self.config.float_dtype, self.config.int_dtype)
                .map_err(|e| {
                    tracing::error!(id = %id, field = %name, error = %e, "failed to cast field");
                    e
                })?;
            cast.insert(name, field);
        }
        let record = Arc::new(Record::new(cast));

        if let Some(cache) = &self.cache {
            if cache.has_room() {
                cache.insert(&self.cache_key(&id), record.clone())?;
                tracing::debug!(id = %id, size = cache.size(), "record cached");
            }
        }

        Ok((id, record))
    }

    /// Mean of the identity-augmented note sequence of `id`.
    fn note_mean(&self, index: usize, id: &str) -> Result<f64> {
        let modality = &self.modalities[index];
        match modality.load(&Query::augmented(id, Augment::IDENTITY))? {
            Value::Pair(notes, _) => notes.mean().ok_or_else(|| {
                DatasetError::unexpected_value(format!("\"{}\" has an empty note sequence", id))
            }),
            _ => Err(DatasetError::unexpected_value(format!(
                "expected (note_seq, tempo_seq) from \"{}\"",
                modality.spec.name
            ))),
        }
    }

    /// Truncates every non-exempt field to the shortest one, then masks and
    /// crops them with one shared span.
    fn align<R: Rng + ?Sized>(&self, fields: &mut FieldMap, rng: &mut R) {
        let aligned: Vec<String> = fields
            .keys()
            .filter(|k| !self.config.not_align.contains(*k))
            .cloned()
            .collect();
        let Some(length) = aligned.iter().filter_map(|k| fields.get(k)).map(Field::len).min() else {
            return;
        };

        for key in &aligned {
            if let Some(field) = fields.get_mut(key) {
                *field = field.truncate(length);
            }
        }

        let training = self.sampler.is_training();
        if training && self.config.mask_aug {
            let mask_len = rng.gen_range(0..=(length as f64 * 0.2) as usize);
            let span = if length > mask_len {
                let start = rng.gen_range(0..=length - mask_len);
                start..start + mask_len
            } else {
                0..length
            };
            for key in &aligned {
                if let Some(field) = fields.get_mut(key) {
                    field.zero_rows(span.clone());
                }
            }
        }

        if training && self.config.random_crop {
            let crop_len = rng.gen_range((length as f64 * 0.8) as usize..=length);
            let start = rng.gen_range(0..=length - crop_len);
            for key in &aligned {
                if let Some(field) = fields.get_mut(key) {
                    *field = field.slice_rows(start..start + crop_len);
                }
            }
        }
    }
}

impl fmt::Display for SvsDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SvsDataset(")?;
        for m in &self.modalities {
            write!(
                f,
                "\n  {}: {{\"path\": \"{}\", \"type\": \"{}\"}}",
                m.spec.name,
                m.spec.path.display(),
                m.spec.loader_type
            )?;
        }
        match &self.preprocess {
            Some(p) => write!(f, "\n  preprocess: {})", p.describe()),
            None => write!(f, "\n  preprocess: None)"),
        }
    }
}

impl fmt::Debug for SvsDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Hex digest over the declarations, the preprocessing and every setting
/// that shapes a record. Cache placement, the fd budget and the seed are left
/// out.
fn record_scope(
    modalities: &[Modality],
    preprocess: Option<&dyn Preprocessor>,
    config: &DatasetConfig,
) -> Result<String> {
    let settings = DatasetConfig {
        max_cache_size: 0,
        cache_mode: CacheMode::Local,
        max_cache_fd: 0,
        seed: None,
        ..config.clone()
    };

    let mut hasher = Sha256::new();
    for m in modalities {
        hasher.update(m.spec.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(m.spec.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(m.spec.loader_type.as_bytes());
        hasher.update(b"\n");
    }
    if let Some(p) = preprocess {
        hasher.update(p.describe().as_bytes());
    }
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(&settings)?);
    Ok(hex::encode(&hasher.finalize()[..8]))
}

fn check_config(config: &DatasetConfig) -> Result<()> {
    match config.validate() {
        Some(reason) => Err(DatasetError::invalid_config(reason)),
        None => Ok(()),
    }
}

fn check_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    let mut any = false;
    for name in names {
        any = true;
        if !seen.insert(name) {
            return Err(DatasetError::duplicate_modality(name));
        }
    }
    if !any {
        return Err(DatasetError::invalid_config("At least one modality is required"));
    }
    Ok(())
}

fn run_preprocess(
    preprocess: &dyn Preprocessor,
    id: &str,
    fields: FieldMap,
    time_factor: f64,
) -> Result<FieldMap> {
    let before: BTreeSet<String> = fields.keys().cloned().collect();
    let out = preprocess.process(id, fields, time_factor)?;
    let after: BTreeSet<String> = out.keys().cloned().collect();
    if before != after {
        let missing: Vec<_> = before.difference(&after).collect();
        let extra: Vec<_> = after.difference(&before).collect();
        return Err(DatasetError::preprocess_contract(format!(
            "preprocessing of \"{}\" changed the field set (missing {:?}, extra {:?})",
            id, missing, extra
        )));
    }
    Ok(out)
}
