//! Concurrent dependency resolution.
//!
//! The resolver walks the registry's paginated registration indexes while
//! overlapping network latency: every user spec seeds an index fetch, each
//! completed fetch may enqueue fetches for newly discovered dependencies, and
//! the driver loop awaits whichever request finishes first. Selection is
//! "highest satisfying version", preferring leaves inlined in the index over
//! page scans. There is no constraint solver here: an admission filter skips
//! dependencies the current plan already satisfies, which is sound because
//! every planned entry is an exact pin.

use crate::cancel::CancelToken;
use crate::plan::InstallPlan;
use crate::range::VersionRange;
use crate::registry::{
    CatalogEntry, DependencyEntry, RegistrationIndex, RegistrationPage, RegistryClient,
    RegistryError,
};
use crate::spec::ModuleSpec;
use crate::store::ModuleStore;
use crate::version::{self, VersionError};
use futures_util::future::{BoxFuture, try_join_all};
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use log::{debug, warn};
use semver::Version;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// How long a driver sleeps before re-checking the cancellation token.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors from planning an installation.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("module not found in registry: {module}")]
    ModuleNotFound { module: String },

    #[error("no version satisfies {spec}")]
    NoSatisfyingVersion { spec: ModuleSpec },

    #[error("registry returned an empty or malformed document for {spec}")]
    InvalidRegistryResponse { spec: ModuleSpec },

    #[error("registry error while resolving {spec}: {source}")]
    Registry {
        spec: ModuleSpec,
        #[source]
        source: RegistryError,
    },

    #[error("invalid dependency range '{range}' declared by {spec}: {source}")]
    InvalidDependency {
        spec: ModuleSpec,
        range: String,
        #[source]
        source: VersionError,
    },

    #[error("resolution cancelled")]
    Cancelled,

    #[error("internal resolver invariant violated: {0}")]
    Internal(String),
}

/// The resolver's output: the plan plus the specs that were short-circuited
/// by the local scanner.
#[derive(Debug)]
pub struct Resolution {
    pub plan: InstallPlan,
    pub satisfied_locally: Vec<ModuleSpec>,
}

/// A catalog entry with its parsed version.
#[derive(Debug, Clone)]
struct Candidate {
    version: Version,
    entry: CatalogEntry,
}

type FetchResult = (ModuleSpec, Result<RegistrationIndex, RegistryError>);

/// Concurrent planner over one registry endpoint.
#[derive(Debug)]
pub struct Resolver {
    client: Arc<RegistryClient>,
    store: ModuleStore,
    prerelease: bool,
    update: bool,
}

impl Resolver {
    #[must_use]
    pub fn new(client: Arc<RegistryClient>, store: ModuleStore) -> Self {
        Self {
            client,
            store,
            prerelease: false,
            update: false,
        }
    }

    /// Include pre-release versions in selection.
    #[must_use]
    pub const fn with_prerelease(mut self, prerelease: bool) -> Self {
        self.prerelease = prerelease;
        self
    }

    /// Resolve against the registry even when a satisfying module is already
    /// installed locally.
    #[must_use]
    pub const fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Resolve user specs into an install plan.
    ///
    /// # Errors
    ///
    /// Returns the first resolution failure; see [`ResolveError`]. On
    /// cancellation all in-flight requests are aborted.
    pub async fn resolve(
        &self,
        specs: &[ModuleSpec],
        cancel: &CancelToken,
    ) -> Result<Resolution, ResolveError> {
        let mut plan = InstallPlan::new();
        // For each plan member, the constraints it was resolved to satisfy.
        let mut origins: HashMap<ModuleSpec, Vec<ModuleSpec>> = HashMap::new();
        let mut satisfied_locally = Vec::new();
        let mut pending: FuturesUnordered<BoxFuture<'static, FetchResult>> =
            FuturesUnordered::new();

        for spec in specs {
            if self.found_locally(spec) {
                satisfied_locally.push(spec.clone());
                continue;
            }
            pending.push(self.fetch_task(spec.clone()));
        }

        loop {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            let completed = match timeout(POLL_INTERVAL, pending.next()).await {
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(completed)) => completed,
            };

            let (spec, result) = completed;
            let index = match result {
                Ok(index) => index,
                Err(RegistryError::ModuleNotFound { module }) => {
                    return Err(ResolveError::ModuleNotFound { module });
                }
                Err(source) => return Err(ResolveError::Registry { spec, source }),
            };
            if index.is_empty() {
                return Err(ResolveError::InvalidRegistryResponse { spec });
            }

            // Another completion may have planned a satisfying version while
            // this fetch was in flight.
            if !admit(&plan, &spec) {
                debug!("{spec} already satisfied by the plan, dropping completion");
                record_satisfied(&plan, &mut origins, spec);
                continue;
            }

            let selected = self.select_entry(&index, &spec, cancel).await?;
            let Some(download_uri) = selected.entry.package_content.clone() else {
                return Err(ResolveError::InvalidRegistryResponse { spec });
            };
            let resolved = ModuleSpec::exact(selected.entry.id.clone(), selected.version.clone())
                .with_download_uri(download_uri);

            if plan.contains(&resolved) {
                origins.entry(resolved).or_default().push(spec);
                continue;
            }
            debug!("planned {resolved} for {spec}");
            plan.add(resolved.clone());
            origins.insert(resolved.clone(), vec![spec]);
            prune_superseded(&mut plan, &mut origins, &resolved);

            for dependency in selected.entry.dependencies() {
                let dep = dependency_spec(dependency).map_err(|source| {
                    ResolveError::InvalidDependency {
                        spec: resolved.clone(),
                        range: dependency.range().to_string(),
                        source,
                    }
                })?;
                if !admit(&plan, &dep) {
                    record_satisfied(&plan, &mut origins, dep);
                    continue;
                }
                if self.found_locally(&dep) {
                    satisfied_locally.push(dep);
                    continue;
                }
                debug!("queueing dependency {dep} of {resolved}");
                pending.push(self.fetch_task(dep));
            }
        }

        Ok(Resolution {
            plan,
            satisfied_locally,
        })
    }

    fn fetch_task(&self, spec: ModuleSpec) -> BoxFuture<'static, FetchResult> {
        let client = Arc::clone(&self.client);
        async move {
            let result = client.fetch_index(&spec.name).await;
            (spec, result)
        }
        .boxed()
    }

    /// Whether the local scanner short-circuits this spec. Scanner failures
    /// are non-fatal and treated as "not found locally".
    fn found_locally(&self, spec: &ModuleSpec) -> bool {
        if self.update {
            return false;
        }
        match self.store.find_local(spec) {
            Ok(Some(manifest)) => {
                debug!("{spec} satisfied locally by {}", manifest.display());
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!("local scan failed for {spec}: {err}");
                false
            }
        }
    }

    /// Select the single catalog entry for the highest satisfying version,
    /// preferring inlined leaves and falling back to a bounded page scan.
    async fn select_entry(
        &self,
        index: &RegistrationIndex,
        spec: &ModuleSpec,
        cancel: &CancelToken,
    ) -> Result<Candidate, ResolveError> {
        let mut candidates = collect_inlined(index, self.prerelease);
        let mut best = select_highest(&candidates, spec);

        if best.is_none() {
            let pages = self.fetch_candidate_pages(index, spec, cancel).await?;
            for page in &pages {
                if let Some(leaves) = &page.items {
                    collect_leaves(leaves, self.prerelease, &mut candidates);
                }
            }
            best = select_highest(&candidates, spec);
        }

        let Some(best_version) = best else {
            return Err(ResolveError::NoSatisfyingVersion { spec: spec.clone() });
        };

        let mut matching = candidates
            .into_iter()
            .filter(|candidate| version::compare(&candidate.version, &best_version).is_eq());
        let selected = matching.next().ok_or_else(|| {
            ResolveError::Internal(format!("selected version {best_version} has no entry"))
        })?;
        if matching.next().is_some() {
            return Err(ResolveError::Internal(format!(
                "expected exactly one catalog entry for {} {best_version}",
                spec.name
            )));
        }
        Ok(selected)
    }

    /// Fetch every linked page whose bounds might contain a satisfying
    /// version, concurrently, re-checking cancellation while waiting.
    async fn fetch_candidate_pages(
        &self,
        index: &RegistrationIndex,
        spec: &ModuleSpec,
        cancel: &CancelToken,
    ) -> Result<Vec<RegistrationPage>, ResolveError> {
        let mut fetches = Vec::new();
        for page in index.items.iter().filter(|page| page.items.is_none()) {
            if !page_may_satisfy(spec, page)
                .map_err(|_| ResolveError::InvalidRegistryResponse { spec: spec.clone() })?
            {
                continue;
            }
            let client = Arc::clone(&self.client);
            let url = page.id.clone();
            let module = spec.name.clone();
            fetches.push(async move { client.fetch_page(&url, &module).await });
        }
        if fetches.is_empty() {
            return Ok(Vec::new());
        }

        let mut join = Box::pin(try_join_all(fetches));
        loop {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            match timeout(POLL_INTERVAL, &mut join).await {
                Err(_) => continue,
                Ok(result) => {
                    return result.map_err(|source| ResolveError::Registry {
                        spec: spec.clone(),
                        source,
                    });
                }
            }
        }
    }
}

/// Parse one declared dependency into a materialized spec.
fn dependency_spec(dependency: &DependencyEntry) -> Result<ModuleSpec, VersionError> {
    let range = VersionRange::parse(dependency.range())?;
    ModuleSpec::from_range(dependency.id(), &range)
}

/// Whether a spec still needs its own registry fetch, given the plan so far.
///
/// Skip only when some planned version of the same module already satisfies
/// it: the highest planned version sits inside the spec's window, or a
/// required spec's exact version is planned.
fn admit(plan: &InstallPlan, spec: &ModuleSpec) -> bool {
    let planned = plan.planned_versions(&spec.name);
    let Some(top) = planned.first() else {
        return true;
    };
    if spec.has_min() && version::compare(&spec.min, top) == Ordering::Greater {
        return true;
    }
    if spec.has_max() && version::compare(&spec.max, top) == Ordering::Less {
        return true;
    }
    if let Some(required) = spec.required() {
        if !planned
            .iter()
            .any(|version| version::compare(version, required).is_eq())
        {
            return true;
        }
    }
    false
}

/// Attach a satisfied constraint to the plan member that satisfies it, so
/// later pruning knows every constraint a member is carrying.
fn record_satisfied(
    plan: &InstallPlan,
    origins: &mut HashMap<ModuleSpec, Vec<ModuleSpec>>,
    spec: ModuleSpec,
) {
    let satisfier = plan
        .iter()
        .find(|member| {
            member.name.eq_ignore_ascii_case(&spec.name)
                && member.required().is_some_and(|v| spec.matches(v))
        })
        .cloned();
    if let Some(member) = satisfier {
        origins.entry(member).or_default().push(spec);
    }
}

/// Drop same-name members whose every recorded constraint the new member
/// also satisfies. An exact dependency pin supersedes a range's higher pick,
/// keeping the emitted plan independent of completion ordering.
fn prune_superseded(
    plan: &mut InstallPlan,
    origins: &mut HashMap<ModuleSpec, Vec<ModuleSpec>>,
    added: &ModuleSpec,
) {
    let Some(added_version) = added.required().cloned() else {
        return;
    };
    let stale: Vec<ModuleSpec> = plan
        .iter()
        .filter(|member| *member != added && member.name.eq_ignore_ascii_case(&added.name))
        .filter(|member| {
            origins.get(member).is_some_and(|constraints| {
                !constraints.is_empty()
                    && constraints
                        .iter()
                        .all(|constraint| constraint.matches(&added_version))
            })
        })
        .cloned()
        .collect();

    for member in stale {
        debug!("dropping {member} from plan; {added} satisfies its constraints");
        plan.remove(&member);
        if let Some(mut constraints) = origins.remove(&member) {
            origins
                .entry(added.clone())
                .or_default()
                .append(&mut constraints);
        }
    }
}

/// Collect candidates from pages whose leaves are materialized in the index.
fn collect_inlined(index: &RegistrationIndex, prerelease: bool) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for page in &index.items {
        if let Some(leaves) = &page.items {
            collect_leaves(leaves, prerelease, &mut candidates);
        }
    }
    candidates
}

fn collect_leaves(
    leaves: &[crate::registry::RegistrationLeaf],
    prerelease: bool,
    candidates: &mut Vec<Candidate>,
) {
    for leaf in leaves {
        let entry = leaf.clone().into_entry();
        if !prerelease && entry.version.contains('-') {
            continue;
        }
        match version::parse_either(&entry.version) {
            Ok(version) => candidates.push(Candidate { version, entry }),
            Err(err) => {
                warn!(
                    "skipping unparseable version '{}' of {}: {err}",
                    entry.version, entry.id
                );
            }
        }
    }
}

fn select_highest(candidates: &[Candidate], spec: &ModuleSpec) -> Option<Version> {
    candidates
        .iter()
        .filter(|candidate| spec.matches(&candidate.version))
        .max_by(|a, b| version::compare(&a.version, &b.version))
        .map(|candidate| candidate.version.clone())
}

/// Whether a page's `[lower, upper]` window might contain a version
/// satisfying `spec`.
fn page_may_satisfy(spec: &ModuleSpec, page: &RegistrationPage) -> Result<bool, VersionError> {
    let lower = version::parse_either(&page.lower)?;
    let upper = version::parse_either(&page.upper)?;

    if let Some(required) = spec.required() {
        return Ok(version::compare(&lower, required).is_le()
            && version::compare(&upper, required).is_ge());
    }

    let subsumes = version::compare(&spec.min, &lower).is_le()
        && version::compare(&spec.max, &upper).is_ge();
    let min_inside = version::compare(&spec.min, &lower).is_ge()
        && version::compare(&spec.min, &upper).is_le();
    let max_inside = version::compare(&spec.max, &lower).is_ge()
        && version::compare(&spec.max, &upper).is_le();
    Ok(subsumes || min_inside || max_inside)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(input: &str) -> ModuleSpec {
        input.parse().unwrap()
    }

    fn resolved(name: &str, version: &str) -> ModuleSpec {
        ModuleSpec::exact(name, version::parse_either(version).unwrap())
            .with_download_uri(format!("https://example.test/{name}.{version}.nupkg"))
    }

    fn page(lower: &str, upper: &str) -> RegistrationPage {
        serde_json::from_value(serde_json::json!({
            "@id": format!("https://example.test/registration/m/page/{lower}/{upper}.json"),
            "lower": lower,
            "upper": upper
        }))
        .unwrap()
    }

    mod page_selection {
        use super::*;

        #[test]
        fn required_version_inside_bounds() {
            let s = spec("M@1.2.0");
            assert!(page_may_satisfy(&s, &page("1.0.0", "1.5.0")).unwrap());
            assert!(!page_may_satisfy(&s, &page("2.0.0", "3.0.0")).unwrap());
            assert!(page_may_satisfy(&s, &page("1.2.0", "1.2.0")).unwrap());
        }

        #[test]
        fn range_subsumes_page() {
            let s = spec("M:1.0.0-9.0.0");
            assert!(page_may_satisfy(&s, &page("2.0.0", "3.0.0")).unwrap());
        }

        #[test]
        fn endpoint_inside_page() {
            let s = spec("M:1.5.0-2.5.0");
            assert!(page_may_satisfy(&s, &page("1.0.0", "2.0.0")).unwrap());
            assert!(page_may_satisfy(&s, &page("2.0.0", "3.0.0")).unwrap());
            assert!(!page_may_satisfy(&s, &page("3.0.0", "4.0.0")).unwrap());
        }

        #[test]
        fn unbounded_spec_touches_every_page() {
            let s = spec("M");
            assert!(page_may_satisfy(&s, &page("1.0.0", "2.0.0")).unwrap());
        }
    }

    mod admission {
        use super::*;

        #[test]
        fn empty_plan_admits() {
            let plan = InstallPlan::new();
            assert!(admit(&plan, &spec("A")));
        }

        #[test]
        fn satisfied_range_is_skipped() {
            let mut plan = InstallPlan::new();
            plan.add(resolved("A", "1.5.0"));
            assert!(!admit(&plan, &spec("A:1.0.0-2.0.0")));
            assert!(!admit(&plan, &spec("a")));
        }

        #[test]
        fn min_above_top_admits() {
            let mut plan = InstallPlan::new();
            plan.add(resolved("A", "1.5.0"));
            assert!(admit(&plan, &spec("A>2.0.0")));
        }

        #[test]
        fn max_below_top_admits() {
            let mut plan = InstallPlan::new();
            plan.add(resolved("A", "1.5.0"));
            assert!(admit(&plan, &spec("A<1.0.0")));
        }

        #[test]
        fn required_not_planned_admits() {
            let mut plan = InstallPlan::new();
            plan.add(resolved("A", "1.5.0"));
            assert!(admit(&plan, &spec("A@1.0.0")));
            assert!(!admit(&plan, &spec("A@1.5.0")));
        }
    }

    mod pruning {
        use super::*;

        #[test]
        fn exact_pin_supersedes_range_pick() {
            let mut plan = InstallPlan::new();
            let mut origins = HashMap::new();

            let ranged = resolved("C", "1.2.0");
            plan.add(ranged.clone());
            origins.insert(ranged, vec![spec("C:1.0.0-2.0.0")]);

            let pinned = resolved("C", "1.0.0");
            plan.add(pinned.clone());
            origins.insert(pinned.clone(), vec![spec("C@1.0.0")]);
            prune_superseded(&mut plan, &mut origins, &pinned);

            assert_eq!(plan.len(), 1);
            assert!(plan.contains(&pinned));
            assert_eq!(origins[&pinned].len(), 2);
        }

        #[test]
        fn unsatisfied_constraints_keep_their_member() {
            let mut plan = InstallPlan::new();
            let mut origins = HashMap::new();

            let newer = resolved("C", "2.0.0");
            plan.add(newer.clone());
            origins.insert(newer.clone(), vec![spec("C>1.5.0")]);

            let pinned = resolved("C", "1.0.0");
            plan.add(pinned.clone());
            origins.insert(pinned.clone(), vec![spec("C@1.0.0")]);
            prune_superseded(&mut plan, &mut origins, &pinned);

            assert_eq!(plan.len(), 2);
            assert!(plan.contains(&newer));
        }
    }

    mod selection {
        use super::*;

        fn candidate(version: &str) -> Candidate {
            Candidate {
                version: version::parse_either(version).unwrap(),
                entry: serde_json::from_value(serde_json::json!({
                    "id": "M",
                    "version": version,
                    "packageContent": format!("https://example.test/m.{version}.nupkg")
                }))
                .unwrap(),
            }
        }

        #[test]
        fn highest_matching_wins() {
            let candidates = vec![candidate("1.0.0"), candidate("1.1.0"), candidate("2.0.0")];
            assert_eq!(
                select_highest(&candidates, &spec("M")).unwrap().to_string(),
                "2.0.0"
            );
            assert_eq!(
                select_highest(&candidates, &spec("M@[1.0.0,2.0.0)"))
                    .unwrap()
                    .to_string(),
                "1.1.0"
            );
            assert!(select_highest(&candidates, &spec("M@9.9.9")).is_none());
        }
    }
}
