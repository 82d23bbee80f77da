//! Position validation before anything is sent to the engine.
//!
//! Engines react to a bad `position` command in unpredictable ways (some
//! ignore it, some crash), so the FEN and the move list are replayed with
//! `cozy-chess` first.

use anyhow::{anyhow, bail, Result};
use cozy_chess::{Board, File, Move, Piece, Rank, Square};

/// Check that `fen` (or the start position) parses and that every move in
/// `moves` is legal in sequence.
pub fn validate(fen: Option<&str>, moves: &[String]) -> Result<()> {
    let mut board = match fen {
        Some(fen) => Board::from_fen(fen, false)
            .map_err(|e| anyhow!("invalid FEN {:?}: {:?}", fen, e))?,
        None => Board::default(),
    };

    for (ply, text) in moves.iter().enumerate() {
        let mv: Move = text
            .parse()
            .map_err(|e| anyhow!("move {} '{}' is not UCI notation: {:?}", ply + 1, text, e))?;
        let mv = to_board_castling(&board, mv);
        if board.try_play(mv).is_err() {
            bail!("move {} '{}' is illegal in this position", ply + 1, text);
        }
    }

    Ok(())
}

/// UCI writes castling as the king moving two squares (e1g1); cozy-chess
/// writes it as the king capturing its own rook (e1h1).
fn to_board_castling(board: &Board, mv: Move) -> Move {
    if board.piece_on(mv.from) != Some(Piece::King)
        || mv.from.file() != File::E
        || !matches!(mv.from.rank(), Rank::First | Rank::Eighth)
        || mv.promotion.is_some()
    {
        return mv;
    }

    let rook_file = match mv.to.file() {
        File::G => File::H,
        File::C => File::A,
        _ => return mv,
    };
    let castle = Move {
        from: mv.from,
        to: Square::new(rook_file, mv.from.rank()),
        promotion: None,
    };
    if board.is_legal(castle) {
        castle
    } else {
        mv
    }
}
