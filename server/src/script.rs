//! Broadcast scripts replayed to viewers
//!
//! A script is an ordered list of Broadcast bodies. It is either read from a
//! JSON-lines file, one Broadcast object per line, or generated as a short
//! synthetic race between two players from a seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use shared::{Broadcast, Scores, ShotInfo, Snapshot};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

const DEMO_PLAYERS: [&str; 2] = ["alice", "bob"];
const DEMO_TARGET_SCORE: i64 = 5;
const DEMO_OBJECT_BALLS: usize = 9;
const TABLE_WIDTH: f64 = 1.27;
const TABLE_LENGTH: f64 = 2.54;
const BALL_RADIUS: f64 = 0.028575;
const POCKETED: u64 = 4;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cannot read script: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("script contains no broadcasts")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastScript {
    broadcasts: Vec<Broadcast>,
}

impl BroadcastScript {
    pub fn new(broadcasts: Vec<Broadcast>) -> Result<Self, ScriptError> {
        if broadcasts.is_empty() {
            return Err(ScriptError::Empty);
        }
        Ok(Self { broadcasts })
    }

    /// Parses one Broadcast per line. Blank lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ScriptError> {
        let mut broadcasts = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let broadcast = serde_json::from_str(&line).map_err(|source| ScriptError::Parse {
                line: index + 1,
                source,
            })?;
            broadcasts.push(broadcast);
        }
        Self::new(broadcasts)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// A race to five between two players. The same seed always yields the
    /// same match.
    pub fn demo(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut balls = racked_balls(&mut rng);
        let mut scores: Scores = DEMO_PLAYERS.iter().map(|name| (*name, 0)).collect();
        let mut shooter = 0;
        let mut broadcasts = Vec::new();

        loop {
            let player = DEMO_PLAYERS[shooter];
            let potted = rng.gen_bool(0.5);

            scatter(&mut balls, &mut rng);
            if potted {
                pocket_next(&mut balls);
                let score = scores.get(player).unwrap_or(0) + 1;
                scores.insert(player, score);
            } else {
                shooter = 1 - shooter;
            }

            let winner = scores
                .iter()
                .find(|(_, score)| *score >= DEMO_TARGET_SCORE)
                .map(|(name, _)| name.to_string());
            let clock = (rng.gen_range(1.0..4.0_f64) * 100.0).round() / 100.0;

            broadcasts.push(Broadcast {
                snapshot: demo_snapshot(clock, &balls),
                shot_info: ShotInfo {
                    player: winner
                        .clone()
                        .unwrap_or_else(|| DEMO_PLAYERS[shooter].to_string()),
                    game_over: winner.is_some(),
                    winner: winner.clone(),
                },
                scores: scores.clone(),
            });

            if winner.is_some() {
                break;
            }
        }

        Self { broadcasts }
    }

    pub fn broadcasts(&self) -> &[Broadcast] {
        &self.broadcasts
    }

    pub fn len(&self) -> usize {
        self.broadcasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty()
    }
}

struct DemoBall {
    id: String,
    x: f64,
    y: f64,
    pocketed: bool,
}

fn racked_balls(rng: &mut StdRng) -> Vec<DemoBall> {
    let mut balls = vec![DemoBall {
        id: "cue".to_string(),
        x: TABLE_WIDTH / 2.0,
        y: TABLE_LENGTH / 4.0,
        pocketed: false,
    }];
    for number in 1..=DEMO_OBJECT_BALLS {
        balls.push(DemoBall {
            id: number.to_string(),
            x: rng.gen_range(BALL_RADIUS..TABLE_WIDTH - BALL_RADIUS),
            y: rng.gen_range(TABLE_LENGTH / 2.0..TABLE_LENGTH - BALL_RADIUS),
            pocketed: false,
        });
    }
    balls
}

fn scatter(balls: &mut [DemoBall], rng: &mut StdRng) {
    for ball in balls.iter_mut().filter(|ball| !ball.pocketed) {
        ball.x = rng.gen_range(BALL_RADIUS..TABLE_WIDTH - BALL_RADIUS);
        ball.y = rng.gen_range(BALL_RADIUS..TABLE_LENGTH - BALL_RADIUS);
    }
}

fn pocket_next(balls: &mut [DemoBall]) {
    if let Some(ball) = balls
        .iter_mut()
        .skip(1)
        .find(|ball| !ball.pocketed)
    {
        ball.pocketed = true;
    }
}

fn demo_snapshot(clock: f64, balls: &[DemoBall]) -> Snapshot {
    let mut ball_map = Map::new();
    for ball in balls {
        let state = if ball.pocketed { POCKETED } else { 0 };
        ball_map.insert(
            ball.id.clone(),
            json!({
                "state": {
                    "rvw": [[ball.x, ball.y, BALL_RADIUS], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
                    "s": state,
                    "t": clock,
                },
                "params": { "R": BALL_RADIUS },
            }),
        );
    }

    let raw = json!({
        "t": clock,
        "table": { "w": TABLE_WIDTH, "l": TABLE_LENGTH },
        "balls": Value::Object(ball_map),
    });
    Snapshot::from_value(raw).unwrap_or_else(|| Snapshot::at(clock))
}
