//! GPU machine gate for externally licensed accounts.

use keb_core::AdditionalWorkerNodePool;

/// Machine-type prefixes of GPU-class machines.
pub const GPU_MACHINE_PREFIXES: [&str; 4] = ["g2-standard", "g6", "g4dn", "Standard_NC"];

pub fn is_gpu_machine(machine_type: &str) -> bool {
    GPU_MACHINE_PREFIXES.iter().any(|p| machine_type.starts_with(p))
}

/// Group the names of pools matching `pred` by machine type, keeping the
/// order in which machine types first appear.
pub(crate) fn group_by_machine<'a>(
    pools: &'a [AdditionalWorkerNodePool],
    pred: impl Fn(&AdditionalWorkerNodePool) -> bool,
) -> Vec<(&'a str, Vec<&'a str>)> {
    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    for pool in pools.iter().filter(|p| pred(p)) {
        match groups.iter_mut().find(|(m, _)| *m == pool.machine_type) {
            Some((_, names)) => names.push(&pool.name),
            None => groups.push((&pool.machine_type, vec![&pool.name])),
        }
    }
    groups
}

/// Reject GPU machines in any pool. Only called for external customers.
pub fn check_gpu_machines(pools: &[AdditionalWorkerNodePool]) -> Result<(), String> {
    let groups = group_by_machine(pools, |p| is_gpu_machine(&p.machine_type));
    if groups.is_empty() {
        return Ok(());
    }
    let listed: Vec<String> = groups
        .iter()
        .map(|(machine, names)| format!("{machine} (used in worker node pools: {})", names.join(", ")))
        .collect();
    Err(format!(
        "The following GPU machine types: {} are not available for your account. \
         For details, please contact your sales representative.",
        listed.join(", ")
    ))
}
