//! Carrier spawn points, handed out round-robin

/// A launch position and the yaw that faces the world origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Yaw in radians, rounded to 3 decimals
    pub facing: f64,
}

/// Fixed carrier decks visited in order, shared by initial placement and respawn
#[derive(Debug, Clone)]
pub struct SpawnCycle {
    points: Vec<(f64, f64, f64)>,
    cursor: usize,
}

impl SpawnCycle {
    /// Four carriers on the cardinal axes: north, east, south, west
    pub fn carriers(distance: f64, altitude: f64) -> Self {
        Self {
            points: vec![
                (0.0, altitude, -distance),
                (distance, altitude, 0.0),
                (0.0, altitude, distance),
                (-distance, altitude, 0.0),
            ],
            cursor: 0,
        }
    }

    /// Issue the point under the cursor and advance it
    pub fn next(&mut self) -> SpawnPoint {
        let (x, y, z) = self.points[self.cursor];
        self.cursor = (self.cursor + 1) % self.points.len();
        SpawnPoint {
            x,
            y,
            z,
            facing: facing_origin(x, z),
        }
    }

    /// Index of the point the next call to `next` returns
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Yaw that turns the aircraft's +Z nose toward (0, 0) from (x, z)
pub fn facing_origin(x: f64, z: f64) -> f64 {
    let yaw = (0.0 - x).atan2(0.0 - z);
    (yaw * 1000.0).round() / 1000.0
}
