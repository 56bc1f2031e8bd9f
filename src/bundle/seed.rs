// src/bundle/seed.rs -- the baked-in prefetch lists
// Copyright 2019-2020 the Tectonic Project
// Licensed under the MIT License.

//! Two ordered name lists ship inside the binary. The init seed covers the
//! files the engine touches on any compile before user macros run; the
//! format seed covers the extra files only initex needs while dumping the
//! LaTeX format. Seeding them up front keeps fetches from interleaving
//! with engine passes.

/// Files every compile needs, newline-separated, in fetch order.
pub const INIT_SEED: &str = include_str!("seed_init.txt");

/// Additional files needed only while generating `xelatex.fmt`.
pub const FORMAT_SEED: &str = include_str!("seed_format.txt");

fn list(text: &'static str) -> impl Iterator<Item = &'static str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

pub fn init_files() -> impl Iterator<Item = &'static str> {
    list(INIT_SEED)
}

pub fn format_files() -> impl Iterator<Item = &'static str> {
    list(FORMAT_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_nonempty_and_clean() {
        let init: Vec<_> = init_files().collect();
        let fmt: Vec<_> = format_files().collect();

        assert!(!init.is_empty());
        assert!(!fmt.is_empty());

        for name in init.iter().chain(fmt.iter()) {
            assert!(!name.contains(' '), "seed name with a space: {:?}", name);
        }
    }

    #[test]
    fn format_seed_includes_the_stub_target() {
        assert!(format_files().any(|n| n == "tectonic-format-latex.tex"));
    }
}
