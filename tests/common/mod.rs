pub mod synthetic_grid;
