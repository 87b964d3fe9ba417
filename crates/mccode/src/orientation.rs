//! Component placement: vectors, rotation angles, and absolute orientations.
//!
//! Placement coordinates stay symbolic so instrument parameters may appear in
//! `AT`/`ROTATED` clauses; arithmetic between literal coordinates folds
//! through the expression builders. An [`Orient`] is the composed absolute
//! placement of an instance: an eagerly computed position plus the ordered
//! chain of rotations it inherited, from which the homogeneous 4×4 can be
//! produced on demand.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::{Expr, PrintStyle};

const DEG2RAD: f64 = std::f64::consts::PI / 180.0;

/// A position offset `(x, y, z)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub x: Expr,
    pub y: Expr,
    pub z: Expr,
}

impl Vector {
    pub fn new(x: Expr, y: Expr, z: Expr) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(Expr::int(0), Expr::int(0), Expr::int(0))
    }

    pub fn is_null(&self) -> bool {
        self.x.is_zero() && self.y.is_zero() && self.z.is_zero()
    }

    pub fn components(&self) -> [&Expr; 3] {
        [&self.x, &self.y, &self.z]
    }

    /// Whether `name` appears as a free identifier in any component.
    pub fn uses_id(&self, name: &str) -> bool {
        self.components().iter().any(|e| e.ids().contains(&name))
    }
}

impl Default for Vector {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Rotation angles `(rx, ry, rz)` in degrees, applied about x, then y, then z.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Angles {
    pub x: Expr,
    pub y: Expr,
    pub z: Expr,
}

impl Angles {
    pub fn new(x: Expr, y: Expr, z: Expr) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(Expr::int(0), Expr::int(0), Expr::int(0))
    }

    pub fn is_null(&self) -> bool {
        self.x.is_zero() && self.y.is_zero() && self.z.is_zero()
    }

    pub fn components(&self) -> [&Expr; 3] {
        [&self.x, &self.y, &self.z]
    }

    pub fn uses_id(&self, name: &str) -> bool {
        self.components().iter().any(|e| e.ids().contains(&name))
    }

    fn constant_degrees(&self) -> Option<[f64; 3]> {
        let get = |e: &Expr| e.constant().ok().and_then(|v| match &v.payload {
            crate::expr::Payload::Int(i) => Some(*i as f64),
            crate::expr::Payload::Float(f) => Some(*f),
            _ => None,
        });
        Some([get(&self.x)?, get(&self.y)?, get(&self.z)?])
    }
}

impl fmt::Display for Angles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A 3×3 rotation matrix with symbolic entries.
type Matrix = [[Expr; 3]; 3];

fn identity() -> Matrix {
    [
        [Expr::int(1), Expr::int(0), Expr::int(0)],
        [Expr::int(0), Expr::int(1), Expr::int(0)],
        [Expr::int(0), Expr::int(0), Expr::int(1)],
    ]
}

fn cos_deg(angle: &Expr) -> Expr {
    let radians = angle.clone().mul(Expr::float(DEG2RAD));
    Expr::unary_func("cos", radians.clone()).unwrap_or_else(|_| Expr::unary_op("cos", radians))
}

fn sin_deg(angle: &Expr) -> Expr {
    let radians = angle.clone().mul(Expr::float(DEG2RAD));
    Expr::unary_func("sin", radians.clone()).unwrap_or_else(|_| Expr::unary_op("sin", radians))
}

/// Rotation matrix for `angles` (degrees), `Rz · Ry · Rx`.
fn rotation_matrix(angles: &Angles) -> Matrix {
    let (ca, sa) = (cos_deg(&angles.x), sin_deg(&angles.x));
    let (cb, sb) = (cos_deg(&angles.y), sin_deg(&angles.y));
    let (cc, sc) = (cos_deg(&angles.z), sin_deg(&angles.z));
    let rx = [
        [Expr::int(1), Expr::int(0), Expr::int(0)],
        [Expr::int(0), ca.clone(), sa.clone().neg()],
        [Expr::int(0), sa, ca],
    ];
    let ry = [
        [cb.clone(), Expr::int(0), sb.clone()],
        [Expr::int(0), Expr::int(1), Expr::int(0)],
        [sb.neg(), Expr::int(0), cb],
    ];
    let rz = [
        [cc.clone(), sc.clone().neg(), Expr::int(0)],
        [sc, cc, Expr::int(0)],
        [Expr::int(0), Expr::int(0), Expr::int(1)],
    ];
    multiply(&rz, &multiply(&ry, &rx))
}

fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    std::array::from_fn(|i| {
        std::array::from_fn(|j| {
            (0..3).fold(Expr::int(0), |acc, k| {
                acc.add(a[i][k].clone().mul(b[k][j].clone()))
            })
        })
    })
}

fn rotate_vector(m: &Matrix, v: &Vector) -> Vector {
    let apply = |row: &[Expr; 3]| {
        row[0]
            .clone()
            .mul(v.x.clone())
            .add(row[1].clone().mul(v.y.clone()))
            .add(row[2].clone().mul(v.z.clone()))
    };
    Vector::new(apply(&m[0]), apply(&m[1]), apply(&m[2]))
}

/// Absolute placement of an instance: composed position plus the inherited
/// rotation chain, sufficient to recompute either the absolute coordinates or
/// the homogeneous transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Orient {
    position: Vector,
    rotations: Vec<Angles>,
}

impl Orient {
    pub fn origin() -> Self {
        Self {
            position: Vector::zero(),
            rotations: Vec::new(),
        }
    }

    /// Compose an absolute orientation from a translation relative to
    /// `at_parent` and a rotation relative to `rot_parent` (either may be
    /// absent for ABSOLUTE placement).
    pub fn from_dependent(
        at_parent: Option<&Self>,
        at: &Vector,
        rot_parent: Option<&Self>,
        angles: &Angles,
    ) -> Self {
        let position = match at_parent {
            Some(parent) => {
                let rotated = rotate_vector(&parent.rotation(), at);
                Vector::new(
                    parent.position.x.clone().add(rotated.x),
                    parent.position.y.clone().add(rotated.y),
                    parent.position.z.clone().add(rotated.z),
                )
            }
            None => at.clone(),
        };
        let mut rotations = rot_parent.map(|p| p.rotations.clone()).unwrap_or_default();
        if !angles.is_null() {
            rotations.push(angles.clone());
        }
        Self { position, rotations }
    }

    /// The absolute position, folded to literals when every part is constant.
    pub fn position(&self) -> Vector {
        self.position.clone()
    }

    /// The absolute rotation as a single set of angles.
    ///
    /// When every rotation in the chain is constant the matrices compose
    /// numerically and the Euler angles are re-extracted. Symbolic chains
    /// sum component-wise, exact for the coaxial rotations instruments use.
    pub fn angles(&self) -> Angles {
        if self.rotations.is_empty() {
            return Angles::zero();
        }
        if self.rotations.len() == 1 {
            return self.rotations[0].clone();
        }
        if let Some(numeric) = self.constant_rotation() {
            return numeric;
        }
        self.rotations.iter().skip(1).fold(self.rotations[0].clone(), |acc, a| {
            Angles::new(
                acc.x.add(a.x.clone()),
                acc.y.add(a.y.clone()),
                acc.z.add(a.z.clone()),
            )
        })
    }

    /// The composed 3×3 rotation matrix.
    pub fn rotation(&self) -> Matrix {
        self.rotations
            .iter()
            .fold(identity(), |acc, a| multiply(&rotation_matrix(a), &acc))
    }

    /// The homogeneous 4×4 transform (rotation block plus translation).
    pub fn seitz(&self) -> [[Expr; 4]; 4] {
        let r = self.rotation();
        let p = self.position();
        let row = |i: usize, t: &Expr| {
            [
                r[i][0].clone(),
                r[i][1].clone(),
                r[i][2].clone(),
                t.clone(),
            ]
        };
        [
            row(0, &p.x),
            row(1, &p.y),
            row(2, &p.z),
            [Expr::int(0), Expr::int(0), Expr::int(0), Expr::int(1)],
        ]
    }

    pub fn uses_id(&self, name: &str) -> bool {
        self.position.uses_id(name) || self.rotations.iter().any(|a| a.uses_id(name))
    }

    fn constant_rotation(&self) -> Option<Angles> {
        let mut m = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        for angles in &self.rotations {
            let [a, b, c] = angles.constant_degrees()?;
            let (sa, ca) = (a * DEG2RAD).sin_cos();
            let (sb, cb) = (b * DEG2RAD).sin_cos();
            let (sc, cc) = (c * DEG2RAD).sin_cos();
            // Rz·Ry·Rx for this link
            let r = [
                [cc * cb, cc * sb * sa - sc * ca, cc * sb * ca + sc * sa],
                [sc * cb, sc * sb * sa + cc * ca, sc * sb * ca - cc * sa],
                [-sb, cb * sa, cb * ca],
            ];
            let mut next = [[0.0f64; 3]; 3];
            for (i, next_row) in next.iter_mut().enumerate() {
                for (j, cell) in next_row.iter_mut().enumerate() {
                    *cell = (0..3).map(|k| r[i][k] * m[k][j]).sum();
                }
            }
            m = next;
        }
        let ry = (-m[2][0]).atan2((m[2][1] * m[2][1] + m[2][2] * m[2][2]).sqrt());
        let rx = m[2][1].atan2(m[2][2]);
        let rz = m[1][0].atan2(m[0][0]);
        let deg = |v: f64| {
            let d = v / DEG2RAD;
            let rounded = d.round();
            if (d - rounded).abs() < 1e-6 {
                Expr::int(rounded as i64)
            } else {
                Expr::float(d)
            }
        };
        Some(Angles::new(deg(rx), deg(ry), deg(rz)))
    }
}

impl fmt::Display for Orient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AT {} ROTATED {}", self.position, self.angles())
    }
}

/// Render a placement triplet for reporting, e.g. `AT (0, 0, 1) RELATIVE a`.
pub fn placement_str(which: &str, v: &Vector, reference: Option<&str>, style: PrintStyle) -> String {
    let triplet = format!(
        "({}, {}, {})",
        v.x.to_style(style),
        v.y.to_style(style),
        v.z.to_style(style)
    );
    match reference {
        None => format!("{which} {triplet} ABSOLUTE"),
        Some(name) => format!("{which} {triplet} RELATIVE {name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_translations_fold() {
        let a = Orient::from_dependent(None, &Vector::zero(), None, &Angles::zero());
        let at = Vector::new(Expr::int(0), Expr::int(0), Expr::int(2));
        let b = Orient::from_dependent(Some(&a), &at, Some(&a), &Angles::zero());
        let c = Orient::from_dependent(Some(&b), &at, Some(&b), &Angles::zero());
        let p = c.position();
        assert!(p.z.is_value(4.0), "expected 4, got {}", p.z);
    }

    #[test]
    fn symbolic_translation_stays_symbolic() {
        let a = Orient::origin();
        let at = Vector::new(Expr::int(0), Expr::int(0), Expr::id("dist"));
        let b = Orient::from_dependent(Some(&a), &at, Some(&a), &Angles::zero());
        assert!(b.position().uses_id("dist"));
    }

    #[test]
    fn constant_rotation_composes_numerically() {
        let eighth = Angles::new(Expr::int(0), Expr::int(45), Expr::int(0));
        let a = Orient::from_dependent(None, &Vector::zero(), None, &eighth);
        let b = Orient::from_dependent(Some(&a), &Vector::zero(), Some(&a), &eighth);
        let angles = b.angles();
        assert!(angles.y.is_value(90.0), "expected 90, got {}", angles.y);
        assert!(angles.x.is_zero() && angles.z.is_zero());
    }

    #[test]
    fn rotated_translation() {
        // rotate 90 degrees about y, then advance +z: motion ends up along +x
        let quarter = Angles::new(Expr::int(0), Expr::int(90), Expr::int(0));
        let a = Orient::from_dependent(None, &Vector::zero(), None, &quarter);
        let at = Vector::new(Expr::int(0), Expr::int(0), Expr::int(1));
        let b = Orient::from_dependent(Some(&a), &at, Some(&a), &Angles::zero());
        let p = b.position();
        let x = p.x.constant().unwrap();
        match &x.payload {
            crate::expr::Payload::Int(i) => assert_eq!(*i, 1),
            crate::expr::Payload::Float(f) => assert!((f - 1.0).abs() < 1e-12),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
