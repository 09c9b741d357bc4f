//! Text rendering of shortlists and prescriptions

use std::fmt;

use crate::models::{NutrientAmounts, Prescription};

const NUTRIENTS: [&str; 3] = ["Nitrogen (N)", "Phosphate (P2O5)", "Potash (K2O)"];

fn amounts(a: &NutrientAmounts) -> [f64; 3] {
    [a.nitrogen, a.phosphate, a.potash]
}

/// Shortlist with the current selection marked
pub struct ShortlistView<'a> {
    pub shortlist: &'a [String],
    pub selected: Option<&'a str>,
}

impl fmt::Display for ShortlistView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shortlist.is_empty() {
            return write!(f, "No recommendation yet.");
        }

        writeln!(f, "Recommended crops:")?;
        for (i, crop) in self.shortlist.iter().enumerate() {
            let marker = if Some(crop.as_str()) == self.selected { "*" } else { " " };
            writeln!(f, "  {} {}. {}", marker, i + 1, crop)?;
        }
        Ok(())
    }
}

impl fmt::Display for Prescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Standard prescription: {} ===", self.crop)?;
        writeln!(f)?;

        writeln!(
            f,
            "{:<18} {:>10} {:>10} {:>10}",
            "Nutrient", "Standard", "Soil", "Top-up"
        )?;
        writeln!(f, "{}", "-".repeat(51))?;
        let rows = NUTRIENTS
            .iter()
            .zip(amounts(&self.standard))
            .zip(amounts(&self.current))
            .zip(amounts(&self.top_up));
        for (((name, standard), current), top_up) in rows {
            writeln!(
                f,
                "{:<18} {:>10.1} {:>10.0} {:>10.1}",
                name, standard, current, top_up
            )?;
        }
        writeln!(f)?;
        write!(f, "All amounts in kg/10a.")
    }
}

/// Fertilizer table listing
pub fn format_table(rows: &[(String, NutrientAmounts)]) -> String {
    let mut output = format!(
        "{:<20} {:>10} {:>10} {:>10}\n",
        "Crop", "N", "P2O5", "K2O"
    );
    output.push_str(&format!("{}\n", "-".repeat(53)));
    for (crop, a) in rows {
        output.push_str(&format!(
            "{:<20} {:>10.1} {:>10.1} {:>10.1}\n",
            crop, a.nitrogen, a.phosphate, a.potash
        ));
    }
    output
}
