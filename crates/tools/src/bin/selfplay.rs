/// エンジン自己対局ドライバ。
///
/// 1 つの探索エンジンが全色の手番を担当して連続対局し、結果を JSONL で
/// 出力する。サブツリー再利用・マルチスレッドの煙テストと、設定変更の
/// 簡易な強さ・速度計測に使う。
///
/// # 使用例
///
/// ```shell
/// cargo run -p tools --release --bin selfplay -- \
///   --variant duo --games 10 --simulations 3000 --threads 2
/// ```
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use rblokus_core::search::{Search, SearchConfig, SearchLimits};
use rblokus_core::state::BlokusState;
use rblokus_core::types::Color;
use rblokus_core::variant::Variant;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(clap::Parser, Debug)]
#[command(about = "self-play driver for the rblokus MCTS engine")]
struct Cli {
    /// Game variant (classic | duo)
    #[arg(long, default_value = "duo")]
    variant: Variant,

    /// Number of games
    #[arg(long, default_value_t = 1)]
    games: u32,

    /// Simulations per move
    #[arg(long, default_value_t = 3000.0)]
    simulations: f32,

    /// Search threads
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Tree memory in MiB
    #[arg(long, default_value_t = 256)]
    tree_mib: usize,

    /// Base RNG seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Use RAVE
    #[arg(long, default_value_t = false)]
    rave: bool,

    /// Print every move
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Serialize)]
struct GameRecord {
    game: u32,
    variant: String,
    nu_moves: usize,
    points: Vec<i32>,
    winners: Vec<usize>,
    time_sec: f64,
    simulations_per_sec: f64,
}

// ---------------------------------------------------------------------------
// 対局ループ
// ---------------------------------------------------------------------------

fn run_game(
    cli: &Cli,
    search: &mut Search<BlokusState>,
    game: u32,
) -> Result<GameRecord> {
    let bc = rblokus_core::movegen::BoardConst::get(cli.variant);
    let mut board = rblokus_core::board::Board::new(bc);
    let seed = cli.seed.wrapping_add(game as u64);
    let timer = Instant::now();
    let mut nu_moves = 0usize;
    let mut total_simulations = 0usize;
    loop {
        let state = BlokusState::new(board.clone(), seed);
        if state.is_game_over() {
            break;
        }
        let Some(mv) = search.search(&state, SearchLimits::count(cli.simulations), true) else {
            break;
        };
        total_simulations += search.nu_simulations();
        // 状態側は手番正規化（手詰まり色のスキップ）をしている
        board = state.root_board().clone();
        let c = board.to_play();
        if cli.verbose {
            log::info!(
                "game {game} move {nu_moves}: color {c} plays {}",
                board.board_const().to_string(mv, true)
            );
        }
        board.play(c, mv);
        nu_moves += 1;
    }
    let nu_colors = board.nu_colors();
    let points: Vec<i32> = Color::iter(nu_colors).map(|c| board.points(c)).collect();
    let best = *points.iter().max().unwrap();
    let winners: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p == best)
        .map(|(i, _)| i)
        .collect();
    let time_sec = timer.elapsed().as_secs_f64();
    Ok(GameRecord {
        game,
        variant: cli.variant.to_string(),
        nu_moves,
        points,
        winners,
        time_sec,
        simulations_per_sec: total_simulations as f64 / time_sec.max(1e-9),
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = SearchConfig {
        nu_threads: cli.threads,
        tree_memory: cli.tree_mib << 20,
        rave: cli.rave,
        ..Default::default()
    };
    let mut search: Search<BlokusState> = Search::new(cfg)?;
    let mut wins = vec![0u32; cli.variant.nu_colors() as usize];
    for game in 0..cli.games {
        search.reset_root_val();
        let record = run_game(&cli, &mut search, game)?;
        for &w in &record.winners {
            wins[w] += 1;
        }
        println!("{}", serde_json::to_string(&record)?);
    }
    log::info!("wins by color: {wins:?}");
    Ok(())
}
