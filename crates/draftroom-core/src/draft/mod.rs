// Draft domain: turn order, picks, rosters, budgets, auctions, sessions.

pub mod auction;
pub mod budget;
pub mod executor;
pub mod pick;
pub mod roster;
pub mod session;
pub mod turn;
