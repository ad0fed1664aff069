use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};

use manet_core::error::{ConfigError, ExperimentError, ResourceError};
use manet_models::mobility::path::WaypointPath;
use manet_models::mobility::{Point2D, Trajectory};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// One statement of an ns-2 movement file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ns2Command {
    /// `$node_(i) set X_ v` at the start of the run, or `$ns_ at t "$node_(i) set X_ v"`.
    Set {
        node: u32,
        at: Option<f64>,
        axis: Axis,
        value: f64,
    },
    /// `$ns_ at t "$node_(i) setdest x y speed"`.
    SetDest {
        node: u32,
        at: f64,
        x: f64,
        y: f64,
        speed: f64,
    },
}

struct LineParser<'a> {
    path: &'a Path,
    line: usize,
}

impl LineParser<'_> {
    fn error(&self, reason: impl ToString) -> ConfigError {
        ConfigError::MalformedTrace {
            path: self.path.to_path_buf(),
            line: self.line,
            reason: reason.to_string(),
        }
    }

    fn number(&self, token: Option<&&str>, what: &str) -> Result<f64, ConfigError> {
        let token = token.ok_or_else(|| self.error(format!("missing {}", what)))?;
        let value: f64 = token
            .parse()
            .map_err(|_| self.error(format!("{} {} is not a number", what, token)))?;
        if !value.is_finite() {
            return Err(self.error(format!("{} {} is not finite", what, token)));
        }
        Ok(value)
    }

    fn node(&self, token: Option<&&str>) -> Result<u32, ConfigError> {
        let token = token.ok_or_else(|| self.error("missing node reference"))?;
        token
            .strip_prefix("$node_(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|id| id.parse::<u32>().ok())
            .ok_or_else(|| self.error(format!("{} is not a node reference", token)))
    }

    fn axis(&self, token: Option<&&str>) -> Result<Axis, ConfigError> {
        match token.copied() {
            Some("X_") => Ok(Axis::X),
            Some("Y_") => Ok(Axis::Y),
            Some("Z_") => Ok(Axis::Z),
            Some(other) => Err(self.error(format!("unknown coordinate {}", other))),
            None => Err(self.error("missing coordinate")),
        }
    }

    /// Parses the node statement that follows `$node_(i)`, optionally scheduled at `at`.
    fn node_statement(&self, tokens: &[&str], at: Option<f64>) -> Result<Ns2Command, ConfigError> {
        let node = self.node(tokens.first())?;
        match tokens.get(1).copied() {
            Some("set") => {
                if tokens.len() != 4 {
                    return Err(self.error("expected set <X_|Y_|Z_> <value>"));
                }
                Ok(Ns2Command::Set {
                    node,
                    at,
                    axis: self.axis(tokens.get(2))?,
                    value: self.number(tokens.get(3), "coordinate")?,
                })
            }
            Some("setdest") => {
                let at = at.ok_or_else(|| self.error("setdest needs a time"))?;
                if tokens.len() != 5 {
                    return Err(self.error("expected setdest <x> <y> <speed>"));
                }
                let speed = self.number(tokens.get(4), "speed")?;
                if speed < 0.0 {
                    return Err(self.error(format!("negative speed {}", speed)));
                }
                Ok(Ns2Command::SetDest {
                    node,
                    at,
                    x: self.number(tokens.get(2), "x")?,
                    y: self.number(tokens.get(3), "y")?,
                    speed,
                })
            }
            Some(other) => Err(self.error(format!("unknown node command {}", other))),
            None => Err(self.error("missing node command")),
        }
    }

    fn parse(&self, raw: &str) -> Result<Option<Ns2Command>, ConfigError> {
        let cleaned = raw.replace('"', " ");
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        match tokens.first().copied() {
            None => Ok(None),
            Some(first) if first.starts_with('#') => Ok(None),
            Some(first) if first.starts_with("$god_") => Ok(None),
            Some("$ns_") => {
                if tokens.get(1).copied() != Some("at") {
                    return Err(self.error("expected $ns_ at <time> ..."));
                }
                let at = self.number(tokens.get(2), "time")?;
                if at < 0.0 {
                    return Err(self.error(format!("negative time {}", at)));
                }
                let rest = tokens.get(3..).unwrap_or(&[]);
                if rest.first().is_some_and(|token| token.starts_with("$god_")) {
                    return Ok(None);
                }
                self.node_statement(rest, Some(at)).map(Some)
            }
            Some(first) if first.starts_with("$node_(") => {
                self.node_statement(&tokens, None).map(Some)
            }
            Some(other) => Err(self.error(format!("unexpected statement {}", other))),
        }
    }
}

/// Parses the text of an ns-2 movement file. `path` is only used in errors.
pub fn parse_commands(content: &str, path: &Path) -> Result<Vec<Ns2Command>, ConfigError> {
    let mut commands = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let parser = LineParser {
            path,
            line: index + 1,
        };
        if let Some(command) = parser.parse(raw)? {
            commands.push(command);
        }
    }
    Ok(commands)
}

#[derive(Debug, Clone, Default)]
struct NodeMovement {
    initial_x: Option<f64>,
    initial_y: Option<f64>,
    /// Timed statements in file order, sorted by time before replay.
    timed: Vec<(f64, Ns2Command)>,
}

impl NodeMovement {
    fn replay(mut self) -> Trajectory {
        let start = Point2D::new(self.initial_x.unwrap_or(0.0), self.initial_y.unwrap_or(0.0));
        if self.timed.is_empty() {
            return Trajectory::Fixed(start);
        }
        self.timed.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut path = WaypointPath::new(start);
        for (at_s, command) in self.timed.into_iter() {
            let at = at_s * 1000.0;
            let here = path.interpolate(at);
            path.truncate_after(at);
            path.push(at, here);
            match command {
                Ns2Command::SetDest { x, y, speed, .. } => {
                    if speed > 0.0 {
                        let target = Point2D::new(x, y);
                        let arrival = at + here.distance(&target) / speed * 1000.0;
                        path.push(arrival, target);
                    }
                }
                Ns2Command::Set { axis, value, .. } => {
                    let jumped = match axis {
                        Axis::X => Point2D::new(value, here.y),
                        Axis::Y => Point2D::new(here.x, value),
                        Axis::Z => here,
                    };
                    path.push(at, jumped);
                }
            }
        }
        Trajectory::Waypoints(path)
    }
}

/// Turns parsed statements into one trajectory per node. Every node in `0..node_count` must
/// appear in the trace, statements about other nodes are ignored.
pub fn build_trajectories(
    commands: &[Ns2Command],
    node_count: u32,
    path: &Path,
) -> Result<Vec<Trajectory>, ConfigError> {
    let mut movements: BTreeMap<u32, NodeMovement> = BTreeMap::new();
    for command in commands.iter() {
        let node = match command {
            Ns2Command::Set { node, .. } | Ns2Command::SetDest { node, .. } => *node,
        };
        if node >= node_count {
            continue;
        }
        let movement = movements.entry(node).or_default();
        match *command {
            Ns2Command::Set {
                at: None,
                axis,
                value,
                ..
            } => match axis {
                Axis::X => movement.initial_x = Some(value),
                Axis::Y => movement.initial_y = Some(value),
                Axis::Z => {}
            },
            Ns2Command::Set { at: Some(at), .. } => movement.timed.push((at, *command)),
            Ns2Command::SetDest { at, .. } => movement.timed.push((at, *command)),
        }
    }

    if movements.len() < node_count as usize {
        return Err(ConfigError::TraceCoverage {
            path: path.to_path_buf(),
            covered: movements.len(),
            requested: node_count,
        });
    }
    Ok(movements.into_values().map(NodeMovement::replay).collect())
}

/// Reads an ns-2 movement file into one trajectory per node.
pub fn read_ns2_trace(
    file_path: &Path,
    node_count: u32,
) -> Result<Vec<Trajectory>, ExperimentError> {
    if !file_path.exists() {
        return Err(ResourceError::MissingInput {
            path: file_path.to_path_buf(),
        }
        .into());
    }
    let content = fs::read_to_string(file_path).map_err(|e| ResourceError::read(file_path, e))?;
    let commands = parse_commands(&content, file_path)?;
    debug!("Parsed {} ns-2 statements", commands.len());
    let trajectories = build_trajectories(&commands, node_count, file_path)?;
    info!(
        "Read movements of {} nodes from {}",
        trajectories.len(),
        file_path.display()
    );
    Ok(trajectories)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_statement_kind() {
        let content = r#"
# generated by setdest
$node_(0) set X_ 10.0
$node_(0) set Y_ 20.0
$node_(0) set Z_ 0.0
$god_ set-dist 0 1 16777215
$ns_ at 2.5 "$node_(0) setdest 30.0 20.0 5.0"
$ns_ at 9.0 "$node_(0) set X_ 1.0"
$ns_ at 1.0 "$god_ set-dist 0 1 1"
"#;
        let commands = parse_commands(content, Path::new("scen")).expect("valid trace");
        assert_eq!(commands.len(), 5);
        assert_eq!(
            commands[3],
            Ns2Command::SetDest {
                node: 0,
                at: 2.5,
                x: 30.0,
                y: 20.0,
                speed: 5.0
            }
        );
    }

    #[test]
    fn malformed_line_is_reported_with_its_number() {
        let content = "$node_(0) set X_ 1.0\n$node_(0) set Y_ north\n";
        match parse_commands(content, Path::new("scen")) {
            Err(ConfigError::MalformedTrace { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed trace, got {:?}", other),
        }
    }
}
