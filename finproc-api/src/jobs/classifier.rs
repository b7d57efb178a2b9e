//! File role classification
//!
//! Decides which staged file plays which role in a job. Evidence is tried
//! from strongest to weakest and a file is never bound twice:
//!
//! 1. Explicit `role.<name>` hints sent by the client
//! 2. Filename keywords (only when the extension fits the role)
//! 3. Elimination: a role only one remaining file can hold gets that file
//! 4. Content signatures (worksheet names), when names were not enough
//! 5. First compatible upload, for jobs that ignore surplus files
//! 6. Collecting roles absorb the remaining compatible files
//! 7. Upload order, for jobs that allow positional fallback
//!
//! Classification never fails. Whatever could not be bound is reported in
//! `RoleAssignment::unassigned` and judged by the contract validator.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use super::catalog::{JobType, RoleSpec, Signature, SurplusFiles};
use super::sheets::{is_workbook_extension, SheetInspector};
use super::workspace::StagedFile;

/// Form field prefix for explicit role hints (`role.gst=portal.xlsx`)
pub const ROLE_HINT_PREFIX: &str = "role.";

/// What justified a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    Hint,
    Keyword,
    Elimination,
    Signature,
    FirstCompatible,
    Collected,
    Positional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    pub role: &'static str,
    pub file: StagedFile,
    pub evidence: Evidence,
}

/// Outcome of classification
#[derive(Debug, Clone, Default)]
pub struct RoleAssignment {
    /// In upload order
    pub bindings: Vec<RoleBinding>,
    pub unassigned: Vec<StagedFile>,
}

impl RoleAssignment {
    /// Files bound to `role`, in upload order
    pub fn files_for(&self, role: &str) -> Vec<&StagedFile> {
        self.bindings
            .iter()
            .filter(|b| b.role == role)
            .map(|b| &b.file)
            .collect()
    }

    pub fn count_for(&self, role: &str) -> usize {
        self.bindings.iter().filter(|b| b.role == role).count()
    }

    pub fn binding_for(&self, file_index: usize) -> Option<&RoleBinding> {
        self.bindings
            .iter()
            .find(|b| b.file.upload_index == file_index)
    }
}

/// Client hints: role name → file name
#[derive(Debug, Clone, Default)]
pub struct ClassifyHints {
    pub role_files: HashMap<String, String>,
}

impl ClassifyHints {
    /// Collect `role.<name>` entries from the request's text fields
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let role_files = fields
            .iter()
            .filter_map(|(key, value)| {
                let role = key.strip_prefix(ROLE_HINT_PREFIX)?;
                let value = value.trim();
                if role.is_empty() || value.is_empty() {
                    return None;
                }
                Some((role.to_string(), value.to_string()))
            })
            .collect();
        Self { role_files }
    }
}

/// Bind staged files to the roles of `job`
pub fn classify(
    files: &[StagedFile],
    job: &JobType,
    hints: &ClassifyHints,
    inspector: &dyn SheetInspector,
) -> RoleAssignment {
    let mut state = Classification::new(files, job);

    state.apply_hints(hints);
    state.apply_keywords();
    state.eliminate();
    if state.has_unfilled_single_role() {
        state.apply_signatures(inspector);
        state.eliminate();
    }
    if job.surplus_files == SurplusFiles::Ignore {
        state.apply_first_compatible();
    }
    state.collect_remaining();
    if job.positional_fallback {
        state.apply_positions();
    }

    let assignment = state.finish();
    for binding in &assignment.bindings {
        debug!(
            job = %job.slug(),
            role = binding.role,
            file = %binding.file.original_name,
            evidence = ?binding.evidence,
            "Bound file to role"
        );
    }
    assignment
}

/// Working state: one optional (role index, evidence) slot per file
struct Classification<'a> {
    files: &'a [StagedFile],
    job: &'a JobType,
    slots: Vec<Option<(usize, Evidence)>>,
}

impl<'a> Classification<'a> {
    fn new(files: &'a [StagedFile], job: &'a JobType) -> Self {
        Self {
            files,
            job,
            slots: vec![None; files.len()],
        }
    }

    fn bind(&mut self, file: usize, role: usize, evidence: Evidence) {
        self.slots[file] = Some((role, evidence));
    }

    fn is_free(&self, file: usize) -> bool {
        self.slots[file].is_none()
    }

    fn count(&self, role: usize) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Some((r, _)) if *r == role))
            .count()
    }

    /// Files the role can still take
    fn capacity(&self, role: usize) -> usize {
        match self.job.roles[role].max {
            Some(max) => max.saturating_sub(self.count(role)),
            None => usize::MAX,
        }
    }

    fn free_files(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.files.len()).filter(|i| self.is_free(*i))
    }

    fn compatible_free(&self, role: &RoleSpec) -> Vec<usize> {
        self.free_files()
            .filter(|i| role.accepts_extension(&self.files[*i].extension))
            .collect()
    }

    fn has_unfilled_single_role(&self) -> bool {
        self.job
            .roles
            .iter()
            .enumerate()
            .any(|(i, role)| role.is_single() && self.count(i) == 0)
    }

    fn apply_hints(&mut self, hints: &ClassifyHints) {
        // Iterate roles, not the map, so results do not depend on hash order
        let job = self.job;
        for role_index in 0..job.roles.len() {
            let role = &job.roles[role_index];
            let wanted = match hints.role_files.get(role.name) {
                Some(name) => name,
                None => continue,
            };
            if self.capacity(role_index) == 0 {
                continue;
            }
            let found = self
                .free_files()
                .find(|i| {
                    let f = &self.files[*i];
                    f.original_name == *wanted || f.sanitized_name == *wanted
                })
                .or_else(|| {
                    self.free_files().find(|i| {
                        let f = &self.files[*i];
                        f.original_name.eq_ignore_ascii_case(wanted)
                            || f.sanitized_name.eq_ignore_ascii_case(wanted)
                    })
                });
            match found {
                Some(file) => self.bind(file, role_index, Evidence::Hint),
                None => warn!(
                    "Role hint {}={:?} does not match any uploaded file",
                    role.name, wanted
                ),
            }
        }

        for role in hints.role_files.keys() {
            if self.job.role(role).is_none() {
                warn!("Ignoring hint for unknown role {:?} in {}", role, self.job.slug());
            }
        }
    }

    fn apply_keywords(&mut self) {
        let job = self.job;
        for role_index in 0..job.roles.len() {
            let role = &job.roles[role_index];
            if role.keywords.is_empty() {
                continue;
            }
            let capacity = self.capacity(role_index);
            if capacity == 0 {
                continue;
            }

            let candidates: Vec<usize> = self
                .compatible_free(role)
                .into_iter()
                .filter(|i| self.keyword_owner(&self.files[*i]) == Some(role_index))
                .collect();

            if candidates.len() > capacity {
                debug!(
                    "{} files name role {}; leaving it to later evidence",
                    candidates.len(),
                    role.name
                );
                continue;
            }
            for file in candidates {
                self.bind(file, role_index, Evidence::Keyword);
            }
        }
    }

    /// The single role whose keywords appear in the file name, if exactly one does
    fn keyword_owner(&self, file: &StagedFile) -> Option<usize> {
        let name = file.sanitized_name.to_lowercase();
        let mut owners = self
            .job
            .roles
            .iter()
            .enumerate()
            .filter(|(_, role)| role.keywords.iter().any(|kw| name.contains(kw)))
            .map(|(i, _)| i);
        let first = owners.next()?;
        match owners.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    /// Bind unfilled single roles that only one free file can hold; repeat until stable
    fn eliminate(&mut self) {
        let job = self.job;
        loop {
            let mut progressed = false;
            for role_index in 0..job.roles.len() {
                let role = &job.roles[role_index];
                if !role.is_single() || role.min == 0 || self.count(role_index) > 0 {
                    continue;
                }
                let candidates = self.compatible_free(role);
                if candidates.len() == 1 {
                    self.bind(candidates[0], role_index, Evidence::Elimination);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn apply_signatures(&mut self, inspector: &dyn SheetInspector) {
        let job = self.job;
        for role_index in 0..job.roles.len() {
            let role = &job.roles[role_index];
            let signature = match role.signature {
                Some(signature) => signature,
                None => continue,
            };
            if self.capacity(role_index) == 0 {
                continue;
            }

            let matches: Vec<usize> = self
                .compatible_free(role)
                .into_iter()
                .filter(|i| has_signature(&self.files[*i], signature, inspector))
                .collect();

            match matches.as_slice() {
                [only] => self.bind(*only, role_index, Evidence::Signature),
                [] => debug!("No file carries the {} signature", role.name),
                _ => debug!(
                    "{} files carry the {} signature; ambiguous",
                    matches.len(),
                    role.name
                ),
            }
        }
    }

    /// Give each unfilled single role the earliest upload it accepts
    fn apply_first_compatible(&mut self) {
        let job = self.job;
        for role_index in 0..job.roles.len() {
            let role = &job.roles[role_index];
            if !role.is_single() || self.count(role_index) > 0 {
                continue;
            }
            let first = self
                .compatible_free(role)
                .into_iter()
                .min_by_key(|i| self.files[*i].upload_index);
            if let Some(file) = first {
                self.bind(file, role_index, Evidence::FirstCompatible);
            }
        }
    }

    fn collect_remaining(&mut self) {
        let job = self.job;
        for role_index in 0..job.roles.len() {
            let role = &job.roles[role_index];
            if role.is_single() {
                continue;
            }
            let capacity = self.capacity(role_index);
            for file in self.compatible_free(role).into_iter().take(capacity) {
                self.bind(file, role_index, Evidence::Collected);
            }
        }
    }

    /// Fill roles still short of their minimum with free files in upload order
    fn apply_positions(&mut self) {
        let mut free: Vec<usize> = self.free_files().collect();
        free.sort_by_key(|i| self.files[*i].upload_index);
        let mut free = free.into_iter();

        let job = self.job;
        for role_index in 0..job.roles.len() {
            let role = &job.roles[role_index];
            while self.count(role_index) < role.min {
                match free.next() {
                    Some(file) => self.bind(file, role_index, Evidence::Positional),
                    None => return,
                }
            }
        }
    }

    fn finish(self) -> RoleAssignment {
        let mut assignment = RoleAssignment::default();
        let mut order: Vec<usize> = (0..self.files.len()).collect();
        order.sort_by_key(|i| self.files[*i].upload_index);

        for i in order {
            let file = self.files[i].clone();
            match self.slots[i] {
                Some((role, evidence)) => assignment.bindings.push(RoleBinding {
                    role: self.job.roles[role].name,
                    file,
                    evidence,
                }),
                None => assignment.unassigned.push(file),
            }
        }
        assignment
    }
}

/// An unreadable workbook simply has no signature
fn has_signature(file: &StagedFile, signature: Signature, inspector: &dyn SheetInspector) -> bool {
    if !is_workbook_extension(&file.extension) {
        return false;
    }
    match signature {
        Signature::SheetNamed(wanted) => match inspector.sheet_names(&file.path) {
            Ok(names) => names.iter().any(|n| n.trim() == wanted),
            Err(e) => {
                warn!("Could not inspect {}: {}", file.original_name, e);
                false
            }
        },
    }
}
