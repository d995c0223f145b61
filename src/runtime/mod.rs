//! Interaction state of the three levels. Exactly one runtime is live per sub-level.

pub mod assembly;
pub mod catch;
pub mod grid;

use crate::runtime::assembly::AssemblyBoard;
use crate::runtime::catch::CatchField;
use crate::runtime::grid::GridBoard;

#[derive(Clone, Debug)]
pub enum LevelRuntime {
  Grid(GridBoard),
  Catch(CatchField),
  Assembly(AssemblyBoard),
}
