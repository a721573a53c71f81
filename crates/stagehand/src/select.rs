//! Deployment-time resource selection.
//!
//! A selection pass walks every declared resource once and decides whether
//! it ships with the current deployment, based on the resource's `regions`
//! and `stages` allow-lists and the run's [`DeployContext`]. Dropped
//! resources are deleted from the live [`Service`]; resources dropped for
//! the target stage additionally have their references swept out of the
//! provider's access-policy statements. Survivors are emitted without their
//! restriction keys.
//!
//! The pass is synchronous and single-threaded. Per-resource decisions are
//! independent of one another, and visiting them sequentially also
//! serializes the shared sweep over the provider's statement list.

use crate::service::{PolicyStatement, ResourceMap, Restriction, Service};

/// The concrete deployment target for the current run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeployContext {
    /// Target region, when the host knows it.
    pub region: Option<String>,
    /// Target stage, when the host knows it.
    pub stage: Option<String>,
    /// When set, selection is bypassed entirely and the configuration
    /// proceeds unmodified.
    pub no_deploy: bool,
}

/// Host lifecycle hooks the selection plugin subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HookPoint {
    /// Fired once the host has assembled the initial package.
    AfterPackageInitialize,
    /// Fired before a resource-only deployment initializes.
    BeforeDeployResourceInitialize,
}

impl core::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HookPoint::AfterPackageInitialize => "after:package:initialize",
            HookPoint::BeforeDeployResourceInitialize => "before:deploy:resource:initialize",
        })
    }
}

/// Per-resource outcome of a selection pass.
///
/// Both dimensions are always evaluated, so a resource excluded by region
/// _and_ stage reports both mismatches.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectedResource {
    /// The resource name.
    pub id: String,
    /// Whether the resource survived the pass.
    pub kept: bool,
    /// The resource carried a region restriction that excludes the target.
    pub region_mismatch: bool,
    /// The resource carried a stage restriction that excludes the target.
    pub stage_mismatch: bool,
}

/// Informational summary of one selection pass.
///
/// The mutations have already been applied to the live [`Service`] by the
/// time this report is returned; it exists for inspection and display only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionReport {
    /// Per-resource outcomes, in the order the pass visited them.
    pub resources: Vec<SelectedResource>,
    /// Compact serializations of the policy-statement references removed
    /// because their resource was dropped for the target stage.
    pub removed_references: Vec<String>,
}

impl SelectionReport {
    /// Names of the resources that survived the pass.
    pub fn kept(&self) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| r.kept)
            .map(|r| r.id.as_str())
            .collect()
    }

    /// Names of the resources the pass deleted.
    pub fn dropped(&self) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| !r.kept)
            .map(|r| r.id.as_str())
            .collect()
    }
}

impl core::fmt::Display for SelectionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.resources.is_empty() {
            f.write_str("No resources declared.\n")?;
            return Ok(());
        }
        for resource in &self.resources {
            if resource.kept {
                writeln!(f, "  keep '{}'", resource.id)?;
            } else {
                let cause = match (resource.region_mismatch, resource.stage_mismatch) {
                    (true, true) => "region, stage",
                    (true, false) => "region",
                    (false, true) => "stage",
                    (false, false) => "already removed",
                };
                writeln!(f, "  drop '{}' [{cause}]", resource.id)?;
            }
        }
        for reference in &self.removed_references {
            writeln!(f, "  swept policy reference {reference}")?;
        }
        Ok(())
    }
}

/// Outcome of firing a deployment hook.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// The `no_deploy` flag was set; the configuration was left untouched.
    Skipped,
    /// Selection ran; the service was pruned in place.
    Selected(SelectionReport),
}

/// The resource-selection plugin.
///
/// Holds the deployment context for one invocation and prunes the host's
/// live [`Service`] when one of its deployment hooks fires.
#[derive(Clone, Debug)]
pub struct SelectResource {
    ctx: DeployContext,
}

impl SelectResource {
    pub fn new(ctx: DeployContext) -> Self {
        SelectResource { ctx }
    }

    /// The lifecycle hooks this plugin subscribes to. Both trigger the
    /// same selection pass.
    pub fn hooks(&self) -> [HookPoint; 2] {
        [
            HookPoint::AfterPackageInitialize,
            HookPoint::BeforeDeployResourceInitialize,
        ]
    }

    /// Entry point for the host's hook dispatcher.
    pub fn on_hook(&self, point: HookPoint, service: &mut Service) -> Selection {
        log::debug!("hook {point} fired");
        match point {
            HookPoint::AfterPackageInitialize | HookPoint::BeforeDeployResourceInitialize => {
                self.deploy_hook(service)
            }
        }
    }

    /// Run the selection pass, unless the context says to skip deployment.
    pub fn deploy_hook(&self, service: &mut Service) -> Selection {
        if self.ctx.no_deploy {
            return Selection::Skipped;
        }

        log::info!("select-resource: selecting resources for deployment");
        Selection::Selected(select_all(service, &self.ctx))
    }
}

/// Apply [`select_one`] to every resource declared in the service.
///
/// The key list is snapshotted up front, since deleting entries during a
/// live enumeration is unsafe.
pub fn select_all(service: &mut Service, ctx: &DeployContext) -> SelectionReport {
    let names: Vec<String> = service.resources.resources.keys().cloned().collect();

    let stage_restricted = service
        .resources
        .resources
        .values()
        .filter(|def| !def.stages.is_unrestricted())
        .count();
    if stage_restricted > 0 {
        log::info!("select-resource: found {stage_restricted} resources with stage restrictions");
    }

    let mut report = SelectionReport::default();
    for name in names {
        let selected = select_one(
            &name,
            &mut service.resources.resources,
            &mut service.provider.iam_role_statements,
            ctx,
            &mut report.removed_references,
        );
        report.resources.push(selected);
    }
    report
}

/// Decide whether a single resource ships with this deployment.
///
/// A resource with no restrictions is always kept, and each restriction
/// only filters when the matching context dimension is known. A stage drop
/// also sweeps the provider's access-policy statements for references to
/// the dropped resource; a region drop leaves the statement list alone.
/// Either way the restriction keys are stripped from survivors so the
/// generated template never carries selection metadata.
pub fn select_one(
    name: &str,
    resources: &mut ResourceMap,
    statements: &mut [PolicyStatement],
    ctx: &DeployContext,
    removed_references: &mut Vec<String>,
) -> SelectedResource {
    let Some(def) = resources.get(name) else {
        // Deleting an absent key is a no-op, so an already-deleted resource
        // settles as dropped with nothing else to do.
        return SelectedResource {
            id: name.to_owned(),
            kept: false,
            region_mismatch: false,
            stage_mismatch: false,
        };
    };

    let region_mismatch = !def.regions.allows(ctx.region.as_deref());
    let stage_mismatch = !def.stages.allows(ctx.stage.as_deref());

    if region_mismatch {
        if let Some(region) = ctx.region.as_deref() {
            log::info!("select-resource: '{name}' is not enabled for region {region}, disabling");
        }
        resources.remove(name);
    }

    if stage_mismatch {
        if let Some(stage) = ctx.stage.as_deref() {
            log::info!("select-resource: '{name}' is not enabled for stage {stage}, disabling");
        }
        resources.remove(name);
        removed_references.extend(sweep_statements(statements, name));
    }

    let kept = match resources.get_mut(name) {
        Some(def) => {
            def.regions = Restriction::Unrestricted;
            def.stages = Restriction::Unrestricted;
            true
        }
        None => false,
    };

    SelectedResource {
        id: name.to_owned(),
        kept,
        region_mismatch,
        stage_mismatch,
    }
}

/// Remove references to `name` from every statement's `Resource`
/// collection, returning the serialized form of each removed reference.
///
/// A reference matches when its compact JSON form contains the resource
/// name as a quoted substring. The loose match catches structured
/// references that embed the name (`Ref`, `Fn::GetAtt`, joins). Known
/// limitation: it also claims an unrelated reference that embeds the
/// exact name in quotes.
fn sweep_statements(statements: &mut [PolicyStatement], name: &str) -> Vec<String> {
    let needle = format!("\"{name}\"");
    let mut removed = Vec::new();
    for statement in statements.iter_mut() {
        statement.resource.retain(|reference| {
            let serialized = reference.to_string();
            if serialized.contains(&needle) {
                log::info!(
                    "select-resource: removing policy reference {serialized} \
                    for disabled resource '{name}'"
                );
                removed.push(serialized);
                false
            } else {
                true
            }
        });
    }
    removed
}
