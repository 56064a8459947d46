#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Build-time board selection.
//!
//! Exactly one `board-*` feature picks the [`BoardConfig`] the firmware runs
//! with. `board-cynthion` is the default; enabling one of the others replaces
//! it.

use apollo_core::board::{BoardConfig, BoardFamily, BoardRevision};

#[cfg(all(feature = "board-urti", feature = "board-luna-d21"))]
compile_error!("enable at most one of `board-urti` and `board-luna-d21`");

#[cfg(feature = "board-urti")]
pub const BOARD: BoardConfig = BoardConfig::new(BoardFamily::Urti, BoardRevision::new(1, 0));

#[cfg(feature = "board-luna-d21")]
pub const BOARD: BoardConfig = BoardConfig::new(BoardFamily::LunaD21, BoardRevision::new(0, 7));

#[cfg(not(any(feature = "board-urti", feature = "board-luna-d21")))]
pub const BOARD: BoardConfig = BoardConfig::new(BoardFamily::Cynthion, BoardRevision::new(1, 4));

/// USB product string for the selected board.
pub const fn product_name() -> &'static str {
    match BOARD.family {
        BoardFamily::Cynthion => "Apollo Debugger (Cynthion)",
        BoardFamily::LunaD21 => "Apollo Debugger (LUNA)",
        BoardFamily::Urti => "Apollo Debugger (URTI)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_board_matches_capability_rule() {
        let expected = apollo_core::board::capabilities_for(BOARD.family, BOARD.revision);
        assert_eq!(BOARD.capabilities, expected);
    }

    #[test]
    fn product_name_mentions_apollo() {
        assert!(product_name().starts_with("Apollo"));
    }
}
