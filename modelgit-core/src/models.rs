use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Root entity types of a model database, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelType {
    Project,
    ImpactMethod,
    ImpactCategory,
    ProductSystem,
    Process,
    Flow,
    FlowProperty,
    UnitGroup,
    SocialIndicator,
    Currency,
    Actor,
    Source,
    Location,
    Parameter,
    DqSystem,
    Result,
    Epd,
}

impl ModelType {
    pub const ALL: [ModelType; 17] = [
        ModelType::Project,
        ModelType::ImpactMethod,
        ModelType::ImpactCategory,
        ModelType::ProductSystem,
        ModelType::Process,
        ModelType::Flow,
        ModelType::FlowProperty,
        ModelType::UnitGroup,
        ModelType::SocialIndicator,
        ModelType::Currency,
        ModelType::Actor,
        ModelType::Source,
        ModelType::Location,
        ModelType::Parameter,
        ModelType::DqSystem,
        ModelType::Result,
        ModelType::Epd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Project => "PROJECT",
            ModelType::ImpactMethod => "IMPACT_METHOD",
            ModelType::ImpactCategory => "IMPACT_CATEGORY",
            ModelType::ProductSystem => "PRODUCT_SYSTEM",
            ModelType::Process => "PROCESS",
            ModelType::Flow => "FLOW",
            ModelType::FlowProperty => "FLOW_PROPERTY",
            ModelType::UnitGroup => "UNIT_GROUP",
            ModelType::SocialIndicator => "SOCIAL_INDICATOR",
            ModelType::Currency => "CURRENCY",
            ModelType::Actor => "ACTOR",
            ModelType::Source => "SOURCE",
            ModelType::Location => "LOCATION",
            ModelType::Parameter => "PARAMETER",
            ModelType::DqSystem => "DQ_SYSTEM",
            ModelType::Result => "RESULT",
            ModelType::Epd => "EPD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|t| t.as_str() == upper)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffType {
    Added,
    Modified,
    Deleted,
    NoChange,
}

/// A root entity of the working copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntity {
    pub ref_id: String,
    pub model_type: ModelType,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub last_change: i64,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl ModelEntity {
    pub fn new(model_type: ModelType, ref_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            model_type,
            name: name.into(),
            category: String::new(),
            version: "00.00.000".to_string(),
            last_change: Utc::now().timestamp_millis(),
            content: serde_json::Value::Null,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = normalize_category(&category.into());
        self
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// `category/name`, or just the name for uncategorized entities. A `/`
    /// inside the name is written as `%2F` and `%` as `%25`.
    pub fn path(&self) -> String {
        join_path(&self.category, &self.name)
    }

    /// Serialized form stored as an object. `serde_json` maps are sorted, so the
    /// bytes only depend on the entity's values.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn object_id(&self) -> serde_json::Result<String> {
        Ok(hash_bytes(&self.canonical_bytes()?))
    }
}

pub fn hash_bytes(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

pub(crate) fn normalize_category(category: &str) -> String {
    category
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn join_path(category: &str, name: &str) -> String {
    let name = escape_name(name);
    if category.is_empty() {
        name.into_owned()
    } else {
        format!("{}/{}", category, name)
    }
}

fn escape_name(name: &str) -> Cow<'_, str> {
    if !name.contains(|c| c == '/' || c == '%') {
        return Cow::Borrowed(name);
    }
    Cow::Owned(name.replace('%', "%25").replace('/', "%2F"))
}

fn unescape_name(segment: &str) -> Cow<'_, str> {
    if !segment.contains('%') {
        return Cow::Borrowed(segment);
    }
    let mut name = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(index) = rest.find('%') {
        name.push_str(&rest[..index]);
        let tail = &rest[index..];
        if tail.starts_with("%2F") || tail.starts_with("%2f") {
            name.push('/');
            rest = &tail[3..];
        } else if tail.starts_with("%25") {
            name.push('%');
            rest = &tail[3..];
        } else {
            name.push('%');
            rest = &tail[1..];
        }
    }
    name.push_str(rest);
    Cow::Owned(name)
}

/// One entity's difference between two states of a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub ref_id: String,
    pub model_type: ModelType,
    pub path: String,
    pub diff_type: DiffType,
    /// Object id of the new state; `None` for deletions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl Change {
    pub fn new(
        model_type: ModelType,
        ref_id: impl Into<String>,
        path: impl Into<String>,
        diff_type: DiffType,
    ) -> Self {
        Self {
            ref_id: ref_id.into(),
            model_type,
            path: path.into(),
            diff_type,
            object_id: None,
        }
    }

    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    pub fn category(&self) -> &str {
        self.path.rsplit_once('/').map(|(c, _)| c).unwrap_or("")
    }

    /// The entity name, with `%2F` and `%25` in the last segment decoded.
    pub fn name(&self) -> Cow<'_, str> {
        let segment = self.path.rsplit_once('/').map(|(_, n)| n);
        unescape_name(segment.unwrap_or(self.path.as_str()))
    }

    pub fn has_changed(&self) -> bool {
        self.diff_type != DiffType::NoChange
    }

    pub fn key(&self) -> (ModelType, String) {
        (self.model_type, self.ref_id.clone())
    }
}

/// A change with the classification of both sides of a comparison.
///
/// For workspace commits only the left side is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub change: Change,
    pub left_diff_type: Option<DiffType>,
    pub right_diff_type: Option<DiffType>,
}

impl DiffResult {
    pub fn from_change(change: Change) -> Self {
        let left = Some(change.diff_type);
        Self {
            change,
            left_diff_type: left,
            right_diff_type: None,
        }
    }

    /// Pairs local and remote changes by entity. The record keeps the local
    /// change when both sides touched the entity.
    pub fn compare(local: &[Change], remote: &[Change]) -> Vec<DiffResult> {
        let mut merged: BTreeMap<(ModelType, String), DiffResult> = BTreeMap::new();
        for change in local {
            merged.insert(change.key(), DiffResult::from_change(change.clone()));
        }
        for change in remote {
            merged
                .entry(change.key())
                .and_modify(|r| r.right_diff_type = Some(change.diff_type))
                .or_insert_with(|| DiffResult {
                    change: change.clone(),
                    left_diff_type: None,
                    right_diff_type: Some(change.diff_type),
                });
        }
        let mut results: Vec<DiffResult> = merged.into_values().collect();
        results.sort_by(|a, b| {
            (a.change.model_type, &a.change.path, &a.change.ref_id)
                .cmp(&(b.change.model_type, &b.change.path, &b.change.ref_id))
        });
        results
    }

    pub fn model_type(&self) -> ModelType {
        self.change.model_type
    }

    pub fn ref_id(&self) -> &str {
        &self.change.ref_id
    }

    pub fn category(&self) -> &str {
        self.change.category()
    }

    /// Neither side does anything to the entity.
    pub fn no_action(&self) -> bool {
        let acts = |d: Option<DiffType>| matches!(d, Some(t) if t != DiffType::NoChange);
        !acts(self.left_diff_type) && !acts(self.right_diff_type)
    }
}

impl From<Change> for DiffResult {
    fn from(change: Change) -> Self {
        DiffResult::from_change(change)
    }
}

/// Set of entities identified by `(type, refId)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRefIdSet {
    entries: BTreeSet<(ModelType, String)>,
}

impl TypeRefIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, model_type: ModelType, ref_id: impl Into<String>) -> bool {
        self.entries.insert((model_type, ref_id.into()))
    }

    pub fn contains(&self, model_type: ModelType, ref_id: &str) -> bool {
        self.entries.contains(&(model_type, ref_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ModelType, String)> {
        self.entries.iter()
    }
}

impl FromIterator<(ModelType, String)> for TypeRefIdSet {
    fn from_iter<I: IntoIterator<Item = (ModelType, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a Change> for TypeRefIdSet {
    fn from_iter<I: IntoIterator<Item = &'a Change>>(iter: I) -> Self {
        iter.into_iter().map(Change::key).collect()
    }
}

/// Which model nodes start out selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionSpec {
    All,
    Explicit(TypeRefIdSet),
}

impl SelectionSpec {
    pub fn contains(&self, model_type: ModelType, ref_id: &str) -> bool {
        match self {
            SelectionSpec::All => true,
            SelectionSpec::Explicit(set) => set.contains(model_type, ref_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonIdent {
    pub name: String,
    pub email: String,
}

impl PersonIdent {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for PersonIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// A submitted change colliding with a protected reference library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRestriction {
    pub dataset_ref_id: String,
    pub library_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<ModelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub parent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub author: PersonIdent,
}

impl Commit {
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// Entry of a commit's full tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    pub model_type: ModelType,
    pub ref_id: String,
    pub path: String,
    pub object_id: String,
}

impl TreeEntry {
    pub fn key(&self) -> (ModelType, String) {
        (self.model_type, self.ref_id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "REJECTED_NON_FASTFORWARD")]
    RejectedNonFastForward,
    #[serde(rename = "REJECTED_OTHER_REASON")]
    RejectedOtherReason,
}

/// Outcome of a push. `new_commits` is chronological.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub status: PushStatus,
    #[serde(default)]
    pub new_commits: Vec<Commit>,
}

impl CommitResult {
    pub fn ok(new_commits: Vec<Commit>) -> Self {
        Self {
            status: PushStatus::Ok,
            new_commits,
        }
    }

    pub fn rejected_non_fast_forward() -> Self {
        Self {
            status: PushStatus::RejectedNonFastForward,
            new_commits: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == PushStatus::Ok
    }

    pub fn most_recent_first(&self) -> Vec<&Commit> {
        self.new_commits.iter().rev().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedCommit {
    pub commit: Commit,
    pub entries: Vec<TreeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedObject {
    pub id: String,
    pub data: String,
}

/// Commits and objects sent to a remote, to be applied on top of `expected_head`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPack {
    pub expected_head: Option<String>,
    pub commits: Vec<PackedCommit>,
    pub objects: Vec<PackedObject>,
}
