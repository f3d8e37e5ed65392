//! Single binary web server: JSON API over the bracket builder, draw sessions and results.
//! Run with: cargo run --bin web
//! Listens on 0.0.0.0:8080 by default. Override with env: HOST, PORT.
//! REGISTRATIONS_CSV preloads registrations; SESSION_TTL_HOURS bounds idle draw sessions.

use actix_web::{
    get, post,
    web::{self, Data, Json, Path},
    App, HttpResponse, HttpServer, Responder,
};
use bracket_draw_web::{
    advance, auto_complete, build_group, build_knockout, build_round_elim, cancel_draw,
    commit_draw, group_standings, latest_session_for_bracket, next_candidate,
    on_match_finished, plan_groups, rank_pool, record_result, reset_chain_from, skill_breakdown,
    start_draw, BracketError, BracketId, BracketRepository, DrawSession, DrawSettings,
    DrawSummary, GameScore, GroupOptions, KnockoutOptions, MatchId, MemoryRepository,
    PlannerPolicy, Registration, RegistrationId, RoundElimOptions, ServerConfig, SessionId, Side,
    TournamentId,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Draw session + last activity time (for auto-cleanup).
struct SessionEntry {
    session: DrawSession,
    last_activity: Instant,
}

/// Shared state: the repository plus every draw session by id.
struct AppState {
    repo: MemoryRepository,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

type State = Data<AppState>;

impl AppState {
    fn sessions(&self) -> Result<RwLockWriteGuard<'_, HashMap<SessionId, SessionEntry>>, HttpResponse> {
        self.sessions
            .write()
            .map_err(|_| HttpResponse::InternalServerError().body("lock error"))
    }
}

#[derive(serde::Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
}

fn error_response(e: &BracketError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e {
        BracketError::BracketNotFound(_)
        | BracketError::MatchNotFound(_)
        | BracketError::SessionNotFound(_)
        | BracketError::RegistrationNotFound(_) => HttpResponse::NotFound().json(body),
        BracketError::StaleStep { .. }
        | BracketError::SessionNotActive
        | BracketError::SlotTaken { .. } => HttpResponse::Conflict().json(body),
        BracketError::Storage(_) => HttpResponse::InternalServerError().json(body),
        _ => HttpResponse::BadRequest().json(body),
    }
}

fn respond<T: serde::Serialize>(result: Result<T, BracketError>) -> HttpResponse {
    match result {
        Ok(v) => HttpResponse::Ok().json(v),
        Err(e) => error_response(&e),
    }
}

fn no_session(id: SessionId) -> HttpResponse {
    error_response(&BracketError::SessionNotFound(id))
}

#[derive(Deserialize)]
struct PlanGroupsBody {
    n: usize,
    #[serde(default)]
    policy: PlannerPolicy,
}

#[derive(Deserialize)]
struct AddRegistrationBody {
    name: String,
    rating: Option<f64>,
    seed: Option<u32>,
    rank: Option<u32>,
    #[serde(default = "default_paid")]
    paid: bool,
}

fn default_paid() -> bool {
    true
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StartDrawBody {
    settings: DrawSettings,
    pool: Option<Vec<RegistrationId>>,
}

#[derive(Deserialize)]
struct AdvanceBody {
    registration_id: RegistrationId,
    step: Option<u64>,
}

#[derive(Deserialize)]
struct ResultBody {
    winner: Side,
    #[serde(default)]
    scores: Vec<GameScore>,
}

#[derive(Deserialize)]
struct TournamentPath {
    id: TournamentId,
}

#[derive(Deserialize)]
struct BracketPath {
    id: BracketId,
}

#[derive(Deserialize)]
struct SessionPath {
    id: SessionId,
}

#[derive(Deserialize)]
struct MatchPath {
    id: MatchId,
}

#[get("/api/health")]
async fn api_health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        ok: true,
        service: "bracket-draw-web",
    })
}

/// Plan group sizes for `n` entrants.
#[post("/api/plan-groups")]
async fn api_plan_groups(body: Json<PlanGroupsBody>) -> HttpResponse {
    HttpResponse::Ok().json(plan_groups(body.n, &body.policy))
}

#[get("/api/tournaments/{id}/registrations")]
async fn api_list_registrations(state: State, path: Path<TournamentPath>) -> HttpResponse {
    respond(state.repo.registrations(path.id))
}

#[post("/api/tournaments/{id}/registrations")]
async fn api_add_registration(
    state: State,
    path: Path<TournamentPath>,
    body: Json<AddRegistrationBody>,
) -> HttpResponse {
    let body = body.into_inner();
    let name = body.name.trim();
    if name.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": "Name is required" }));
    }
    let mut reg = Registration::new(path.id, name);
    reg.rating = body.rating;
    reg.seed = body.seed;
    reg.rank = body.rank;
    reg.paid = body.paid;
    let out = reg.clone();
    respond(state.repo.add_registration(reg).map(|_| out))
}

/// Import registrations from a CSV body (`tournament_id,name,rating,seed,paid`).
#[post("/api/registrations/import")]
async fn api_import_registrations(state: State, body: String) -> HttpResponse {
    respond(
        state
            .repo
            .load_registrations_csv(body.as_bytes())
            .map(|added| serde_json::json!({ "added": added })),
    )
}

#[post("/api/tournaments/{id}/brackets/knockout")]
async fn api_build_knockout(
    state: State,
    path: Path<TournamentPath>,
    body: Json<KnockoutOptions>,
) -> HttpResponse {
    respond(build_knockout(&state.repo, path.id, body.into_inner()))
}

#[post("/api/tournaments/{id}/brackets/round-elim")]
async fn api_build_round_elim(
    state: State,
    path: Path<TournamentPath>,
    body: Json<RoundElimOptions>,
) -> HttpResponse {
    respond(build_round_elim(&state.repo, path.id, body.into_inner()))
}

#[post("/api/tournaments/{id}/brackets/group")]
async fn api_build_group(state: State, path: Path<TournamentPath>, body: Json<GroupOptions>) -> HttpResponse {
    respond(build_group(&state.repo, path.id, body.into_inner()))
}

#[get("/api/tournaments/{id}/brackets")]
async fn api_list_brackets(state: State, path: Path<TournamentPath>) -> HttpResponse {
    respond(state.repo.brackets_for_tournament(path.id))
}

/// Bracket with its matches.
#[get("/api/brackets/{id}")]
async fn api_get_bracket(state: State, path: Path<BracketPath>) -> HttpResponse {
    let result = state.repo.bracket(path.id).and_then(|bracket| {
        let matches = state.repo.matches_for_bracket(bracket.id)?;
        Ok(serde_json::json!({ "bracket": bracket, "matches": matches }))
    });
    respond(result)
}

#[get("/api/brackets/{id}/standings")]
async fn api_standings(state: State, path: Path<BracketPath>) -> HttpResponse {
    respond(group_standings(&state.repo, path.id))
}

/// Open a draw session on a bracket.
#[post("/api/brackets/{id}/draw")]
async fn api_start_draw(state: State, path: Path<BracketPath>, body: Option<Json<StartDrawBody>>) -> HttpResponse {
    let body = body.map(Json::into_inner).unwrap_or_default();
    let session = match start_draw(&state.repo, path.id, body.settings, body.pool) {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };
    let mut g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    let id = session.id;
    g.insert(
        id,
        SessionEntry {
            session,
            last_activity: Instant::now(),
        },
    );
    match g.get(&id) {
        Some(entry) => HttpResponse::Ok().json(&entry.session),
        None => no_session(id),
    }
}

/// Latest session on a bracket (active first).
#[get("/api/brackets/{id}/draw")]
async fn api_draw_status(state: State, path: Path<BracketPath>) -> HttpResponse {
    let g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    match latest_session_for_bracket(g.values().map(|e| &e.session), path.id) {
        Some(session) => HttpResponse::Ok().json(DrawSummary::of(session)),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": "No draw session for bracket" })),
    }
}

#[get("/api/draw/{id}")]
async fn api_get_session(state: State, path: Path<SessionPath>) -> HttpResponse {
    let mut g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    match g.get_mut(&path.id) {
        Some(entry) => {
            entry.last_activity = Instant::now();
            HttpResponse::Ok().json(&entry.session)
        }
        None => no_session(path.id),
    }
}

/// Suggested candidate for the slot under the cursor, with the full ranking.
#[get("/api/draw/{id}/next")]
async fn api_draw_next(state: State, path: Path<SessionPath>) -> HttpResponse {
    let mut g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    let Some(entry) = g.get_mut(&path.id) else {
        return no_session(path.id);
    };
    entry.last_activity = Instant::now();
    let session = &entry.session;
    let result = next_candidate(session).and_then(|candidate| {
        Ok(serde_json::json!({
            "candidate": candidate,
            "cursor": session.cursor,
            "step": session.step,
            "ranking": rank_pool(session)?,
        }))
    });
    respond(result)
}

#[post("/api/draw/{id}/advance")]
async fn api_draw_advance(state: State, path: Path<SessionPath>, body: Json<AdvanceBody>) -> HttpResponse {
    let mut g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    let Some(entry) = g.get_mut(&path.id) else {
        return no_session(path.id);
    };
    entry.last_activity = Instant::now();
    match advance(&mut entry.session, body.registration_id, body.step) {
        Ok(reveal) => HttpResponse::Ok().json(serde_json::json!({
            "reveal": reveal,
            "session": &entry.session,
        })),
        Err(e) => error_response(&e),
    }
}

/// Let the engine place everyone left.
#[post("/api/draw/{id}/auto")]
async fn api_draw_auto(state: State, path: Path<SessionPath>) -> HttpResponse {
    let mut g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    let Some(entry) = g.get_mut(&path.id) else {
        return no_session(path.id);
    };
    entry.last_activity = Instant::now();
    match auto_complete(&mut entry.session) {
        Ok(placed) => HttpResponse::Ok().json(serde_json::json!({
            "placed": placed,
            "session": &entry.session,
        })),
        Err(e) => error_response(&e),
    }
}

#[post("/api/draw/{id}/commit")]
async fn api_draw_commit(state: State, path: Path<SessionPath>) -> HttpResponse {
    let mut g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    let Some(entry) = g.get_mut(&path.id) else {
        return no_session(path.id);
    };
    entry.last_activity = Instant::now();
    respond(commit_draw(&state.repo, &mut entry.session))
}

#[post("/api/draw/{id}/cancel")]
async fn api_draw_cancel(state: State, path: Path<SessionPath>) -> HttpResponse {
    let mut g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    let Some(entry) = g.get_mut(&path.id) else {
        return no_session(path.id);
    };
    entry.last_activity = Instant::now();
    respond(cancel_draw(&mut entry.session).map(|_| DrawSummary::of(&entry.session)))
}

/// Skill records used by the session, strongest first.
#[get("/api/draw/{id}/skills")]
async fn api_draw_skills(state: State, path: Path<SessionPath>) -> HttpResponse {
    let g = match state.sessions() {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    match g.get(&path.id) {
        Some(entry) => HttpResponse::Ok().json(skill_breakdown(&entry.session)),
        None => no_session(path.id),
    }
}

/// Record a result and propagate it downstream.
#[post("/api/matches/{id}/result")]
async fn api_record_result(state: State, path: Path<MatchPath>, body: Json<ResultBody>) -> HttpResponse {
    let body = body.into_inner();
    respond(record_result(&state.repo, path.id, body.winner, body.scores))
}

/// Re-run propagation for a finished match (safe to repeat).
#[post("/api/matches/{id}/finished")]
async fn api_match_finished(state: State, path: Path<MatchPath>) -> HttpResponse {
    respond(on_match_finished(&state.repo, path.id))
}

#[post("/api/matches/{id}/reset")]
async fn api_reset_match(state: State, path: Path<MatchPath>) -> HttpResponse {
    respond(reset_chain_from(&state.repo, path.id).map(|touched| serde_json::json!({ "reset": touched })))
}

fn load_registrations(repo: &MemoryRepository, path: &str) {
    match std::fs::File::open(path) {
        Ok(file) => match repo.load_registrations_csv(file) {
            Ok(n) => log::info!("Loaded {} registration(s) from {}", n, path),
            Err(e) => log::error!("Could not import {}: {}", path, e),
        },
        Err(e) => log::error!("Could not open {}: {}", path, e),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env();
    let repo = MemoryRepository::new();
    if let Some(path) = &config.registrations_csv {
        load_registrations(&repo, path);
    }

    let state = Data::new(AppState {
        repo,
        sessions: RwLock::new(HashMap::new()),
    });

    // Background task: every 30 minutes, drop draw sessions idle past the TTL
    let state_cleanup = state.clone();
    let ttl = config.session_ttl;
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(Duration::from_secs(30 * 60));
        loop {
            interval.tick().await;
            let mut g = match state_cleanup.sessions.write() {
                Ok(guard) => guard,
                Err(_) => continue,
            };
            let before = g.len();
            g.retain(|_, entry| entry.last_activity.elapsed() < ttl);
            let removed = before - g.len();
            if removed > 0 {
                log::info!("Cleaned up {} idle draw session(s)", removed);
            }
        }
    });

    log::info!("Starting server at http://{}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(4 * 1024 * 1024))
            .service(api_health)
            .service(api_plan_groups)
            .service(api_list_registrations)
            .service(api_add_registration)
            .service(api_import_registrations)
            .service(api_build_knockout)
            .service(api_build_round_elim)
            .service(api_build_group)
            .service(api_list_brackets)
            .service(api_get_bracket)
            .service(api_standings)
            .service(api_start_draw)
            .service(api_draw_status)
            .service(api_get_session)
            .service(api_draw_next)
            .service(api_draw_advance)
            .service(api_draw_auto)
            .service(api_draw_commit)
            .service(api_draw_cancel)
            .service(api_draw_skills)
            .service(api_record_result)
            .service(api_match_finished)
            .service(api_reset_match)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
