/// Logical operations brewlet runs against the external package manager.
///
/// Process preemption and error attribution are keyed on this value, so two
/// invocations share an operation only when one supersedes the other.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BrewOperation {
    UpdateDatabase,
    ListOutdated,
    ListInstalledFormulae,
    ListInstalledCasks,
    ListFormulaNames,
    ListCaskNames,
    ProbeSource,
    Upgrade,
    Uninstall,
}

impl BrewOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpdateDatabase => "update_database",
            Self::ListOutdated => "list_outdated",
            Self::ListInstalledFormulae => "list_installed_formulae",
            Self::ListInstalledCasks => "list_installed_casks",
            Self::ListFormulaNames => "list_formula_names",
            Self::ListCaskNames => "list_cask_names",
            Self::ProbeSource => "probe_source",
            Self::Upgrade => "upgrade",
            Self::Uninstall => "uninstall",
        }
    }

    /// Probes run many at a time and are never preempted by each other.
    pub fn is_exclusive(self) -> bool {
        !matches!(self, Self::ProbeSource)
    }
}
