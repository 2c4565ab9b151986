use std::env;
use std::fs;
use std::process;

use log::info;

use autofill::{
    run_to_completion, FillConfig, FillEngine, Grid, Result, SearchContext, WordList,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: autofill <wordlist> <template> [seed] [max-steps]");
        process::exit(2);
    }

    let corpus = fs::read_to_string(&args[0])?;
    let word_list = WordList::load(&corpus)?;

    let template = fs::read_to_string(&args[1])?;
    let grid = Grid::from_template(&template)?;
    info!(
        "loaded {}x{} grid with {} slot(s)",
        grid.height,
        grid.width,
        grid.slots().count()
    );

    let config = FillConfig {
        seed: args.get(2).and_then(|arg| arg.parse().ok()).unwrap_or(0),
        ..FillConfig::default()
    };
    let max_steps = args.get(3).and_then(|arg| arg.parse().ok()).unwrap_or(1_000_000);

    let mut ctx = SearchContext::new(word_list, grid, config)?;
    let mut engine = FillEngine::new();
    let complete = run_to_completion(&mut engine, &mut ctx, max_steps)?;

    println!("{}", ctx.active_grid().render());
    println!("{:?}", engine.stats);

    if !complete {
        eprintln!("no complete fill found");
        process::exit(1);
    }
    Ok(())
}
