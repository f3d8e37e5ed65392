//! Bracket algorithms: planning, topology, skill, draw and propagation.

mod draw;
mod group_stage;
mod knockout;
mod planner;
mod propagation;
mod round_elim;
mod scoring;
mod skill;
mod standings;
mod topology;

pub use draw::{
    advance, auto_complete, cancel_draw, commit_draw, latest_session_for_bracket, next_candidate,
    rank_pool, skill_breakdown, start_draw, start_draw_at, DrawSummary,
};
pub use group_stage::{
    build_group, bye_counts, generate_group_matches, round_robin_matches, round_robin_rounds,
    GroupOptions,
};
pub use knockout::{
    bracket_size, build_knockout, spread_positions, spread_seeds, FirstRoundSeed, KnockoutOptions,
    UnfilledSlots,
};
pub use planner::{plan_groups, ByePolicy, GroupPlan, OverflowPolicy, PlannerPolicy, UnderflowPolicy};
pub use propagation::{
    on_match_finished, record_result, reset_chain_from, resolve_bracket, PropagationReport,
};
pub use round_elim::{allowed_rounds, build_round_elim, RoundElimOptions};
pub use scoring::{assign_pots, ensure_seeds, rank_candidates, score_candidate, ScoredCandidate, ScoringContext};
pub use skill::{compute_skill_map, estimate_skills, recent_opponents};
pub use standings::{group_standings, rank_entrants, standings_for_group, GroupStandings, StandingRow};
pub use topology::{round_key_by_pairs, validate_seeds, BuiltBracket};
