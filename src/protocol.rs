//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::config::CatchMode;
use crate::domain::{Difficulty, FinishReason, RatingRecord};
use crate::leaderboard::{SortDir, SortField};
use crate::progression::{NoticeKind, Phase, Session, SUBLEVELS_PER_LEVEL};
use crate::runtime::assembly::{AssemblyBoard, Card, SlotKind, SLOT_KINDS};
use crate::runtime::grid::GridCard;
use crate::runtime::LevelRuntime;
use crate::util::format_clock;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    SelectDifficulty {
        difficulty: Difficulty,
    },
    JumpToLevel {
        level: u8,
    },
    Hint,
    Pick {
        value: i64,
    },
    Catch {
        #[serde(rename = "itemId")]
        item_id: u32,
    },
    MovePlatform {
        x: f64,
    },
    NudgePlatform {
        delta: i32,
    },
    DropCard {
        #[serde(rename = "cardId")]
        card_id: u32,
        slot: usize,
    },
    ClearSlot {
        slot: usize,
    },
    ReturnCard {
        #[serde(rename = "cardId")]
        card_id: u32,
    },
    SlotHint {
        slot: usize,
    },
    CheckExpression,
    Finish,
    Exit,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State {
        view: SessionView,
    },
    Notice {
        kind: NoticeKind,
        text: String,
    },
    Hint {
        text: String,
    },
    GameOver {
        /// "win", "manual", or "exit" when nothing was saved.
        reason: &'static str,
        record: Option<RatingRecord>,
    },
    Error {
        message: String,
    },
}

impl ServerWsMessage {
    pub fn game_over(reason: Option<FinishReason>, record: Option<RatingRecord>) -> Self {
        ServerWsMessage::GameOver { reason: reason.map(FinishReason::as_str).unwrap_or("exit"), record }
    }
}

/// Read projection of a session, sent after every change.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub player: String,
    pub difficulty: Option<Difficulty>,
    pub phase: Phase,
    pub level: u8,
    pub sublevel: u8,
    pub sublevels: u8,
    pub allow_levels: u8,
    /// Rounded for display.
    pub score: i64,
    pub time_left: i64,
    /// `MM:SS`
    pub clock: String,
    pub rule: String,
    pub expected_index: usize,
    pub board: Option<BoardView>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoardView {
    Grid {
        cards: Vec<GridCard>,
    },
    Catch {
        mode: CatchMode,
        #[serde(rename = "fallMs")]
        fall_ms: u64,
        #[serde(rename = "platformX")]
        platform_x: Option<f64>,
        /// False once every needed number has appeared and the spawn ceiling is hit.
        spawning: bool,
        items: Vec<ItemView>,
    },
    Assembly {
        target: f64,
        cards: Vec<Card>,
        slots: Vec<SlotView>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: u32,
    pub value: i64,
    pub x: f64,
    /// 0 at spawn, 1 at expiry; tracked in platform mode only.
    pub progress: Option<f64>,
    pub errored: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub index: usize,
    pub label: &'static str,
    pub kind: SlotKind,
    pub card_id: Option<u32>,
    pub flashing: bool,
}

fn board_view(session: &Session) -> Option<BoardView> {
    let board = match session.runtime()? {
        LevelRuntime::Grid(grid) => BoardView::Grid { cards: grid.cards().to_vec() },
        LevelRuntime::Catch(field) => {
            let platform = field.mode() == CatchMode::Platform;
            BoardView::Catch {
                mode: field.mode(),
                fall_ms: field.fall_ms(),
                platform_x: platform.then(|| field.platform_x()),
                spawning: !field.is_halted(),
                items: field
                    .items()
                    .iter()
                    .map(|i| ItemView {
                        id: i.id,
                        value: i.value,
                        x: i.x,
                        progress: platform.then(|| field.progress(i)),
                        errored: i.errored,
                    })
                    .collect(),
            }
        }
        LevelRuntime::Assembly(board) => BoardView::Assembly {
            target: session.target().unwrap_or_default(),
            cards: board.cards().to_vec(),
            slots: SLOT_KINDS
                .iter()
                .enumerate()
                .map(|(index, kind)| SlotView {
                    index,
                    label: AssemblyBoard::label(index),
                    kind: *kind,
                    card_id: board.slot_card(index).map(|c| c.id),
                    flashing: board.is_flashing(index),
                })
                .collect(),
        },
    };
    Some(board)
}

/// Convert the live `Session` (internal) to the public view.
pub fn to_view(session: &Session) -> SessionView {
    SessionView {
        player: session.player().to_string(),
        difficulty: session.difficulty(),
        phase: session.phase(),
        level: session.level(),
        sublevel: session.sublevel(),
        sublevels: SUBLEVELS_PER_LEVEL,
        allow_levels: session.allow_levels(),
        score: session.score().round() as i64,
        time_left: session.time_left().max(0),
        clock: format_clock(session.time_left()),
        rule: session.rule_text().to_string(),
        expected_index: session.cursor().index(),
        board: board_view(session),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Deserialize)]
pub struct PlayerIn {
    pub name: String,
}
#[derive(Serialize)]
pub struct PlayerOut {
    /// Empty when no player is bound.
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingQuery {
    pub sort: Option<SortField>,
    pub dir: Option<SortDir>,
    /// Column header clicked on top of `sort`/`dir`.
    pub toggle: Option<SortField>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRow {
    pub rank: usize,
    #[serde(flatten)]
    pub record: RatingRecord,
}

#[derive(Debug, Serialize)]
pub struct RatingOut {
    pub sort: SortField,
    pub dir: SortDir,
    pub rows: Vec<RatingRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastResultOut {
    pub record: Option<RatingRecord>,
    /// Best stored score of the current player.
    pub best_score: Option<i64>,
}
