//! Line-oriented soil form and the one-shot recommendation
//!
//! Reads commands from `input` and renders to `output`. Engine errors are
//! shown inline and never end the loop.

use std::io::{BufRead, Write};

use anyhow::Result;

use crate::advisor::{Advisor, Session, Stage};
use crate::models::SoilSample;
use crate::report::ShortlistView;

const HELP: &str = "\
Commands:
  set <field> <value>   ph, om, cec, ca, mg, p, ec, k, drainage
  show                  show the current form and recommendation
  submit                recommend crops for the form values
  select <crop|number>  choose a crop from the shortlist
  help                  show this help
  quit                  leave the session";

/// Run a session until `quit` or end of input
pub fn run<R: BufRead, W: Write>(
    advisor: &Advisor<'_>,
    defaults: SoilSample,
    input: R,
    mut output: W,
) -> Result<()> {
    let mut form = defaults;
    let mut session = Session::new();

    writeln!(output, "{}", HELP)?;
    prompt(&mut output)?;

    for line in input.lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            prompt(&mut output)?;
            continue;
        };
        let rest: Vec<&str> = words.collect();

        match command.to_lowercase().as_str() {
            "quit" | "exit" => break,
            "help" => writeln!(output, "{}", HELP)?,
            "set" => match rest.as_slice() {
                [field, value] => match form.set_field(field, value) {
                    Ok(()) => writeln!(output, "{} = {}", field, value)?,
                    Err(e) => writeln!(output, "Error: {}", e)?,
                },
                _ => writeln!(output, "Usage: set <field> <value>")?,
            },
            "show" => {
                writeln!(output, "Soil sample:\n{}", form)?;
                render(advisor, &session, &form, &mut output)?;
            }
            "submit" => {
                // the form is frozen into a copy for this request
                let sample = form.clone();
                if let Err(e) = advisor.recommend_crops(&mut session, &sample) {
                    tracing::error!(error = %e, "recommendation failed");
                    writeln!(output, "Error: {}", e)?;
                }
                render(advisor, &session, &form, &mut output)?;
            }
            "select" => {
                let choice = rest.join(" ");
                if session.stage() == Stage::NoShortlist {
                    writeln!(output, "Submit the soil form first.")?;
                } else if let Some(crop) = resolve_choice(session.shortlist(), &choice) {
                    advisor.select_crop(&mut session, &crop);
                    render(advisor, &session, &form, &mut output)?;
                } else {
                    writeln!(output, "'{}' is not on the shortlist.", choice)?;
                }
            }
            other => writeln!(output, "Unknown command '{}'. Type 'help'.", other)?,
        }
        prompt(&mut output)?;
    }

    Ok(())
}

/// One pass through the form: recommend, optionally reselect, prescribe.
///
/// Reports go to `output`, engine errors to `errors`. Returns false when
/// the recommendation or the prescription failed.
pub fn recommend_once<W: Write, E: Write>(
    advisor: &Advisor<'_>,
    sample: &SoilSample,
    crop: Option<&str>,
    mut output: W,
    mut errors: E,
) -> Result<bool> {
    let mut session = Session::new();

    if let Err(e) = advisor.recommend_crops(&mut session, sample) {
        writeln!(errors, "Error: {}", e)?;
        return Ok(false);
    }

    if let Some(crop) = crop {
        if !advisor.select_crop(&mut session, crop) {
            writeln!(
                errors,
                "'{}' is not on the shortlist; keeping '{}'",
                crop,
                session.selected().unwrap_or_default()
            )?;
        }
    }

    let view = ShortlistView {
        shortlist: session.shortlist(),
        selected: session.selected(),
    };
    writeln!(output, "{}", view)?;

    let Some(selected) = session.selected() else {
        return Ok(true);
    };
    match advisor.compute_prescription(selected, sample.available_phosphate, sample.potassium) {
        Ok(rx) => {
            writeln!(output, "{}", rx)?;
            Ok(true)
        }
        Err(e) => {
            writeln!(errors, "Error: {}", e)?;
            Ok(false)
        }
    }
}

fn prompt<W: Write>(output: &mut W) -> Result<()> {
    write!(output, "> ")?;
    output.flush()?;
    Ok(())
}

/// Accept either a 1-based shortlist position or a crop name
fn resolve_choice(shortlist: &[String], choice: &str) -> Option<String> {
    if let Ok(n) = choice.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| shortlist.get(i)).cloned();
    }
    shortlist
        .iter()
        .find(|c| c.eq_ignore_ascii_case(choice))
        .cloned()
}

/// Shortlist plus, when a crop is selected, its prescription
fn render<W: Write>(
    advisor: &Advisor<'_>,
    session: &Session,
    form: &SoilSample,
    output: &mut W,
) -> Result<()> {
    let view = ShortlistView {
        shortlist: session.shortlist(),
        selected: session.selected(),
    };
    writeln!(output, "{}", view)?;

    if let Some(crop) = session.selected() {
        match advisor.compute_prescription(crop, form.available_phosphate, form.potassium) {
            Ok(rx) => writeln!(output, "{}", rx)?,
            Err(e) => {
                tracing::error!(error = %e, "prescription failed");
                writeln!(output, "Error: {}", e)?;
            }
        }
    }
    Ok(())
}
