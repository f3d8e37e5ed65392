//! Group capacity planning: how many groups, how big, and how many byes for `n` entrants.

use serde::{Deserialize, Serialize};

/// What to do when the groups hold more slots than there are entrants.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderflowPolicy {
    /// Shrink groups toward `min_size`; leftover becomes byes.
    #[default]
    Shrink,
    /// Keep sizes and report the difference as byes.
    Byes,
}

/// What to do when there are more entrants than slots.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Grow some groups by one.
    #[default]
    Grow,
    /// Open more groups and rebalance.
    ExtraGroup,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByePolicy {
    #[default]
    None,
    /// Always pad to full groups with byes.
    Pad,
}

/// Sizing policy for [`plan_groups`]. `None` (or 0) for size/count means "pick for me".
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerPolicy {
    pub group_size: Option<usize>,
    pub group_count: Option<usize>,
    pub auto_fit: bool,
    pub allow_uneven: bool,
    pub bye_policy: ByePolicy,
    pub overflow_policy: OverflowPolicy,
    pub underflow_policy: UnderflowPolicy,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for PlannerPolicy {
    fn default() -> Self {
        Self {
            group_size: None,
            group_count: None,
            auto_fit: true,
            allow_uneven: true,
            bye_policy: ByePolicy::None,
            overflow_policy: OverflowPolicy::Grow,
            underflow_policy: UnderflowPolicy::Shrink,
            min_size: 3,
            max_size: 16,
        }
    }
}

/// Planned group sizes. `sum(group_sizes) == n + byes`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupPlan {
    pub group_sizes: Vec<usize>,
    pub byes: usize,
}

impl GroupPlan {
    pub fn capacity(&self) -> usize {
        self.group_sizes.iter().sum()
    }
}

/// `count` groups holding `n` entrants: quotient everywhere, remainder on the first groups.
fn spread_evenly(n: usize, count: usize) -> Vec<usize> {
    let avg = n / count;
    let rem = n % count;
    (0..count).map(|i| avg + usize::from(i < rem)).collect()
}

/// Plan group sizes for `n` entrants under `policy`.
///
/// 1. Resolve a working size/count (default size `round(sqrt(n))`, clamped).
/// 2. Exact fit: equal groups.
/// 3. Underflow: byes, or shrink toward `min_size` with byes for what cannot be absorbed.
/// 4. Overflow: grow the first groups by one, or open extra groups.
pub fn plan_groups(n: usize, policy: &PlannerPolicy) -> GroupPlan {
    if n == 0 {
        return GroupPlan::default();
    }
    let min_size = policy.min_size.max(1);
    let max_size = policy.max_size.max(min_size);
    let clamp = |v: usize| v.clamp(min_size, max_size);

    let g_size = policy.group_size.filter(|&s| s > 0).map(clamp);
    let g_count = policy.group_count.filter(|&c| c > 0);

    let (g_size, g_count) = match (g_size, g_count) {
        (Some(s), Some(c)) => (s, c),
        (None, Some(c)) => (clamp(n.div_ceil(c)), c),
        (s, None) => {
            let s = s.unwrap_or_else(|| clamp((n as f64).sqrt().round() as usize));
            (s, n.div_ceil(s))
        }
    };
    let g_count = g_count.max(1);

    let capacity = g_count * g_size;
    if capacity == n {
        return GroupPlan {
            group_sizes: vec![g_size; g_count],
            byes: 0,
        };
    }

    if capacity > n {
        let deficit = capacity - n;
        let padded = GroupPlan {
            group_sizes: vec![g_size; g_count],
            byes: deficit,
        };
        if policy.underflow_policy == UnderflowPolicy::Byes
            || policy.bye_policy == ByePolicy::Pad
            || !policy.allow_uneven
        {
            return padded;
        }

        let mut sizes = vec![g_size; g_count];
        let mut need = deficit;
        for size in sizes.iter_mut() {
            if need == 0 {
                break;
            }
            let cut = need.min(*size - min_size);
            *size -= cut;
            need -= cut;
        }
        if need > 0 && policy.auto_fit && n / g_count >= min_size {
            sizes = spread_evenly(n, g_count);
            need = 0;
        }
        return GroupPlan {
            group_sizes: sizes,
            byes: need,
        };
    }

    let overflow = n - capacity;
    let can_grow = overflow <= g_count && g_size < max_size;
    if policy.overflow_policy == OverflowPolicy::Grow && policy.allow_uneven && can_grow {
        return GroupPlan {
            group_sizes: (0..g_count)
                .map(|i| g_size + usize::from(i < overflow))
                .collect(),
            byes: 0,
        };
    }

    // Extra groups; never so many that the even split drops below min_size.
    let mut count = g_count + overflow.div_ceil(g_size);
    let max_count = (n / min_size).max(1);
    count = count.min(max_count).max(n.div_ceil(max_size));
    GroupPlan {
        group_sizes: spread_evenly(n, count),
        byes: 0,
    }
}
