//! Enforces that exactly one GP flavor feature is selected.
//!
//! Mirrors the C library's build-time flavor choice (`-DRCU_MB`,
//! `-DRCU_SIGNAL`, `-DRCU_MEMBARRIER`): at most one flavor may be linked
//! into a process, so we fail the build rather than let two broadcast
//! barrier strategies silently shadow each other.

fn main() {
    let flavors = [
        ("CARGO_FEATURE_FLAVOR_MEMBARRIER", "flavor-membarrier"),
        ("CARGO_FEATURE_FLAVOR_MB", "flavor-mb"),
        ("CARGO_FEATURE_FLAVOR_SIGNAL", "flavor-signal"),
    ];
    let enabled: Vec<&str> = flavors
        .iter()
        .filter(|(env, _)| std::env::var_os(env).is_some())
        .map(|(_, name)| *name)
        .collect();
    if enabled.len() != 1 {
        panic!(
            "rcu-core requires exactly one flavor feature, got {enabled:?}; \
             pick one of flavor-membarrier, flavor-mb, flavor-signal"
        );
    }

    // The signal flavor's reader barrier relies on real-time signal
    // delivery (SIGRCU via pthread_kill); outside Linux that path is a
    // no-op and smp_mb_master's wait-for-need_mb-to-clear loop would spin
    // forever the first time synchronize() runs with a registered reader.
    // Fail the build instead of shipping a flavor that silently hangs.
    if enabled == ["flavor-signal"] {
        let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
        if target_os != "linux" {
            panic!(
                "rcu-core: flavor-signal is only supported on target_os = \"linux\" \
                 (got \"{target_os}\"); its reader barrier has no non-Linux signal \
                 delivery path and smp_mb_master would hang waiting for it. \
                 Pick flavor-mb or flavor-membarrier instead."
            );
        }
    }
}
