use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use spotdiff_contracts::cards::{find_target, is_target_pick, Card};
use spotdiff_contracts::events::ClearReason;
use spotdiff_contracts::play::{parse_input, GameMode, PlayerInput, PLAY_HELP_COMMANDS};
use spotdiff_contracts::session::MISSES_BEFORE_REVEAL;
use spotdiff_contracts::settings::RoundSettings;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::{json_object, GameSession, PlayArgs};

enum RoundEnd {
    Finished,
    Menu,
    Quit,
}

pub(crate) async fn run_play(args: PlayArgs) -> Result<i32> {
    let settings = RoundSettings {
        use_timer: args.timer,
        use_voice: false,
        difficulty: args.difficulty,
        multi_card_count: args.count,
        ..RoundSettings::default()
    };
    let mut session = GameSession::start(&args.backend, &args.out, "play")?;
    let input = BufReader::new(tokio::io::stdin());
    play_loop(&mut session, settings, input, &mut io::stdout()).await?;
    Ok(0)
}

async fn play_loop<R, W>(
    session: &mut GameSession,
    mut settings: RoundSettings,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut mode = GameMode::Single;
    writeln!(out, "Spot the difference! Press Enter to play a round, /help for commands.")?;

    loop {
        writeln!(
            out,
            "[{mode} | {} | score {}]",
            settings.difficulty, session.tally.score
        )?;
        let Some(command) = prompt(&mut lines, out, "> ").await? else {
            break;
        };
        match command {
            PlayerInput::Noop => {
                let end = match mode {
                    GameMode::Single => single_round(session, &settings, &mut lines, out).await?,
                    GameMode::Multi => multi_round(session, &settings, &mut lines, out).await?,
                };
                match end {
                    RoundEnd::Finished => {}
                    RoundEnd::Menu => return_to_menu(session, out)?,
                    RoundEnd::Quit => break,
                }
            }
            PlayerInput::Help => {
                writeln!(out, "Commands: {}", PLAY_HELP_COMMANDS.join(" "))?;
                writeln!(out, "Press Enter to play a round.")?;
            }
            PlayerInput::Menu => return_to_menu(session, out)?,
            PlayerInput::Quit => break,
            PlayerInput::SetMode(next) => {
                mode = next;
                session.clear_buffers(ClearReason::ModeChanged)?;
                writeln!(out, "Mode set to {mode}")?;
            }
            PlayerInput::SetDifficulty(level) => {
                settings.difficulty = level.unwrap_or_else(|| settings.difficulty.next());
                session.clear_buffers(ClearReason::DifficultyChanged)?;
                writeln!(out, "Difficulty set to {}", settings.difficulty)?;
            }
            PlayerInput::Tap(_) | PlayerInput::Pick(_) => {
                writeln!(out, "Press Enter to start a round first.")?;
            }
            PlayerInput::Invalid(message) => writeln!(out, "{message}")?,
            PlayerInput::Unknown { command, .. } => {
                writeln!(out, "Unknown command /{command}. Try /help.")?;
            }
        }
    }

    let extra = json_object(json!({
        "mode": mode.as_str(),
        "difficulty": settings.difficulty.as_str(),
        "tally": session.tally,
    }));
    let summary = session.finish(Some(&extra))?;
    writeln!(
        out,
        "Thanks for playing! {} rounds, score {}, best streak {}.",
        summary.rounds_played, summary.score, summary.best_streak
    )?;
    Ok(())
}

async fn prompt<R, W>(lines: &mut Lines<R>, out: &mut W, text: &str) -> Result<Option<PlayerInput>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{text}")?;
    out.flush()?;
    let Some(line) = lines.next_line().await? else {
        return Ok(None);
    };
    Ok(Some(parse_input(&line)))
}

fn return_to_menu<W: Write>(session: &mut GameSession, out: &mut W) -> Result<()> {
    session.clear_buffers(ClearReason::Menu)?;
    session.tally.reset();
    writeln!(out, "Back at the menu. Score reset.")?;
    Ok(())
}

fn announce_result<W: Write>(session: &GameSession, success: bool, out: &mut W) -> Result<()> {
    let tally = &session.tally;
    if success {
        writeln!(out, "Correct! Score {} (streak {}).", tally.score, tally.streak)?;
    }
    if tally.at_streak_milestone() {
        writeln!(out, "{} in a row!", tally.streak)?;
    }
    if tally.should_rest() {
        writeln!(out, "{} rounds played. Time for a short break.", tally.rounds_played)?;
    }
    Ok(())
}

async fn single_round<R, W>(
    session: &mut GameSession,
    settings: &RoundSettings,
    lines: &mut Lines<R>,
    out: &mut W,
) -> Result<RoundEnd>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let difficulty = settings.difficulty;
    writeln!(out, "Preparing a card...")?;
    let Some(card) = session.fetch_single(difficulty).await? else {
        writeln!(out, "Could not prepare a card. Try again.")?;
        return Ok(RoundEnd::Finished);
    };
    let dir = session.save_single(&card)?;
    writeln!(out, "Compare the two faces in {}", dir.display())?;

    let mut misses = 0;
    loop {
        let Some(answer) = prompt(lines, out, "Where is the difference? [tl/tr/bl/br/c or x,y] ").await?
        else {
            return Ok(RoundEnd::Quit);
        };
        match answer {
            PlayerInput::Tap(location) => {
                if card.accepts_tap(location, difficulty) {
                    session.finish_round(GameMode::Single, true)?;
                    writeln!(out, "{}", card.diff_description())?;
                    announce_result(session, true, out)?;
                    return Ok(RoundEnd::Finished);
                }
                misses += 1;
                if misses >= MISSES_BEFORE_REVEAL {
                    session.finish_round(GameMode::Single, false)?;
                    writeln!(
                        out,
                        "It was at the {}: {}",
                        card.diff_location(),
                        card.diff_description()
                    )?;
                    announce_result(session, false, out)?;
                    return Ok(RoundEnd::Finished);
                }
                writeln!(
                    out,
                    "Not there. {} tries left.",
                    MISSES_BEFORE_REVEAL - misses
                )?;
            }
            PlayerInput::Menu => return Ok(RoundEnd::Menu),
            PlayerInput::Quit => return Ok(RoundEnd::Quit),
            PlayerInput::Noop => {}
            PlayerInput::Help => {
                writeln!(out, "Answer with tl, tr, bl, br, c or a tap at x,y (0-100).")?;
            }
            PlayerInput::Invalid(message) => writeln!(out, "{message}")?,
            _ => writeln!(out, "Answer with a region or a tap position.")?,
        }
    }
}

async fn multi_round<R, W>(
    session: &mut GameSession,
    settings: &RoundSettings,
    lines: &mut Lines<R>,
    out: &mut W,
) -> Result<RoundEnd>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let difficulty = settings.difficulty;
    let count = settings.effective_card_count();
    writeln!(out, "Preparing {count} cards...")?;
    let Some(cards) = session.fetch_multi(difficulty, count).await? else {
        writeln!(out, "Could not prepare the cards. Try again.")?;
        return Ok(RoundEnd::Finished);
    };
    let dir = session.save_multi(&cards)?;
    writeln!(out, "Memorize the fronts in {}", dir.display())?;
    if let Some(seconds) = settings.memorize_seconds() {
        writeln!(out, "You have {seconds} seconds.")?;
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
    if let Some(target) = cards.iter().find(|card| card.is_target()) {
        writeln!(out, "Now flip them over. One card changed: {}", target.diff_description())?;
    }

    loop {
        let question = format!("Which card changed? [1-{}] ", cards.len());
        let Some(answer) = prompt(lines, out, &question).await? else {
            return Ok(RoundEnd::Quit);
        };
        match answer {
            PlayerInput::Pick(index) if index < cards.len() => {
                let success = is_target_pick(&cards, index);
                session.finish_round(GameMode::Multi, success)?;
                if !success {
                    reveal_target(&cards, out)?;
                }
                announce_result(session, success, out)?;
                return Ok(RoundEnd::Finished);
            }
            PlayerInput::Pick(_) => {
                writeln!(out, "Pick a card between 1 and {}.", cards.len())?;
            }
            PlayerInput::Menu => return Ok(RoundEnd::Menu),
            PlayerInput::Quit => return Ok(RoundEnd::Quit),
            PlayerInput::Noop => {}
            _ => writeln!(out, "Answer with a card number.")?,
        }
    }
}

fn reveal_target<W: Write>(cards: &[Card], out: &mut W) -> Result<()> {
    match find_target(cards) {
        Some(index) => writeln!(out, "Not that one. It was card {}.", index + 1)?,
        None => writeln!(out, "Not that one.")?,
    }
    Ok(())
}
