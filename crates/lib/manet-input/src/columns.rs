pub const TIME_STEP: &str = "time_step";
pub const NODE_ID: &str = "node_id";

pub const COORD_X: &str = "x";
pub const COORD_Y: &str = "y";
