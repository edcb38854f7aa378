//! Text form of a [`Procedure`] in the ".m" dialect.
//!
//! Products and inversion are emitted as calls to helper functions that
//! transcribe `tracking::algebra` line for line, so the exported file performs
//! the same floating point operations in the same order as the live run.

use itertools::Itertools;

use super::procedure::{Expr, Index, Procedure, Statement, Target};
use crate::tracking::Matrix;

const INDENT: &str = "  ";

pub fn render(procedure: &Procedure) -> String {
    let model = procedure.model();
    let mut lines = vec![
        format!("function [t, z, x_true, x_est, err] = {}()", model.name()),
        format!(
            "% Discrete-time linear Kalman filter: {} states, {} measurements, {} steps.",
            model.get_state_dimension(),
            model.get_measurement_dimension(),
            model.steps()
        ),
        "% Every call draws fresh measurement noise.".to_string(),
        String::new(),
        format!("{INDENT}% Model"),
    ];

    for (name, value) in procedure.constants() {
        lines.push(format!("{INDENT}{name} = {};", literal(&value)));
    }
    lines.push(format!("{INDENT}N = {};", model.steps()));
    if model.is_noisy() {
        lines.push(format!("{INDENT}sigma = sqrt(diag(R));"));
    }
    lines.push(match model.dt() {
        Some(dt) => format!("{INDENT}t = {dt:?} * (1:N);"),
        None => format!("{INDENT}t = 1:N;"),
    });

    for statement in procedure.statements() {
        render_statement(statement, 1, &mut lines);
    }
    lines.push("end".to_string());

    lines.push(String::new());
    lines.extend(MAT_MUL.lines().map(str::to_string));
    lines.push(String::new());
    lines.extend(GAUSS_JORDAN_INVERSE.lines().map(str::to_string));
    if model.is_noisy() {
        lines.push(String::new());
        lines.extend(BOX_MULLER.lines().map(str::to_string));
    }

    let mut source = lines.join("\n");
    source.push('\n');
    source
}

fn render_statement(statement: &Statement, depth: usize, lines: &mut Vec<String>) {
    let indent = INDENT.repeat(depth);
    match statement {
        Statement::Comment(text) => {
            if depth == 1 {
                lines.push(String::new());
            }
            lines.push(format!("{indent}% {text}"));
        }
        Statement::Allocate { name, rows } => {
            lines.push(format!("{indent}{name} = zeros({rows}, N);"));
        }
        Statement::Assign { target, value } => {
            let target = match target {
                Target::Var(name) => name.to_string(),
                Target::Column(name, index) => format!("{name}(:, {})", render_index(*index)),
            };
            lines.push(format!("{indent}{target} = {};", render_expr(value)));
        }
        Statement::Loop { from, body } => {
            lines.push(format!("{indent}for k = {}:N", from + 1));
            for inner in body {
                render_statement(inner, depth + 1, lines);
            }
            lines.push(format!("{indent}end"));
        }
    }
}

fn render_index(index: Index) -> &'static str {
    match index {
        Index::First => "1",
        Index::Current => "k",
        Index::Previous => "k - 1",
    }
}

pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Var(name) => name.to_string(),
        Expr::Column(name, index) => format!("{name}(:, {})", render_index(*index)),
        Expr::Product(left, right) => format!("mat_mul({}, {})", render_expr(left), render_expr(right)),
        Expr::Sum(left, right) => format!("{} + {}", render_expr(left), render_operand(right)),
        Expr::Difference(left, right) => format!("{} - {}", render_expr(left), render_operand(right)),
        Expr::Transpose(inner) => match inner.as_ref() {
            Expr::Var(name) => format!("{name}'"),
            other => format!("({})'", render_expr(other)),
        },
        Expr::Inverse(inner) => format!("gauss_jordan_inverse({})", render_expr(inner)),
        Expr::Identity(n) => format!("eye({n})"),
        Expr::Noise(name) => format!("{name} .* box_muller(size({name}, 1))"),
    }
}

/// Right-hand operands of `+`/`-` keep their grouping.
fn render_operand(expr: &Expr) -> String {
    match expr {
        Expr::Sum(..) | Expr::Difference(..) => format!("({})", render_expr(expr)),
        _ => render_expr(expr),
    }
}

/// Matrix literal with round-trip exact entries.
pub fn literal(matrix: &Matrix) -> String {
    let rows = matrix
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|value| format!("{value:?}")).join(", "))
        .join("; ");
    format!("[{rows}]")
}

const MAT_MUL: &str = "\
function C = mat_mul(A, B)
  % Ordered sums over the inner dimension
  C = zeros(size(A, 1), size(B, 2));
  for i = 1:size(A, 1)
    for j = 1:size(B, 2)
      s = 0;
      for l = 1:size(A, 2)
        s = s + A(i, l) * B(l, j);
      end
      C(i, j) = s;
    end
  end
end";

const GAUSS_JORDAN_INVERSE: &str = "\
function X = gauss_jordan_inverse(M)
  % Partial pivoting; singular when |det M| < 1e-10 * max|M|^n
  n = size(M, 1);
  scale = max(abs(M(:)));
  if scale == 0 || ~isfinite(scale)
    error('kalman:singular', 'Singular matrix (determinant 0)');
  end
  W = M;
  X = eye(n);
  d = 1;
  for c = 1:n
    p = c;
    for r = c + 1:n
      if abs(W(r, c)) > abs(W(p, c))
        p = r;
      end
    end
    if p ~= c
      W([c p], :) = W([p c], :);
      X([c p], :) = X([p c], :);
      d = -d;
    end
    pivot = W(c, c);
    d = d * pivot;
    if pivot == 0
      break;
    end
    W(c, :) = W(c, :) / pivot;
    X(c, :) = X(c, :) / pivot;
    for r = 1:n
      if r ~= c && W(r, c) ~= 0
        f = W(r, c);
        W(r, :) = W(r, :) - f * W(c, :);
        X(r, :) = X(r, :) - f * X(c, :);
      end
    end
  end
  if abs(d) < 1e-10 * scale ^ n
    error('kalman:singular', 'Singular matrix (determinant %g)', d);
  end
end";

const BOX_MULLER: &str = "\
function n = box_muller(count)
  % One standard normal per entry from two uniforms in (0, 1)
  n = zeros(count, 1);
  for i = 1:count
    u1 = rand();
    while u1 == 0
      u1 = rand();
    end
    u2 = rand();
    while u2 == 0
      u2 = rand();
    end
    n(i) = sqrt(-2 * log(u1)) * cos(2 * pi * u2);
  end
end";

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::config::{KinematicParameters, LinearParameters};
    use crate::tracking::ModelDefinition;

    fn kinematic() -> Procedure {
        Procedure::for_model(&ModelDefinition::kinematic(&KinematicParameters::default()).unwrap())
    }

    fn linear() -> Procedure {
        Procedure::for_model(&ModelDefinition::linear(&LinearParameters::default()).unwrap())
    }

    #[test]
    fn test_literal() {
        assert_eq!(literal(&array![[1.0, 0.01], [0.0, 1.0]]), "[1.0, 0.01; 0.0, 1.0]");
        assert_eq!(literal(&array![[60.0], [10.0]]), "[60.0; 10.0]");
        assert_eq!(literal(&array![[-2.5]]), "[-2.5]");
    }

    #[test]
    fn test_kinematic_source() {
        let source = kinematic().render();
        let lines: Vec<&str> = source.lines().collect();

        assert_eq!(lines[0], "function [t, z, x_true, x_est, err] = kalmanFilterEstimation()");
        for expected in [
            "  A = [1.0, 0.01; 0.0, 1.0];",
            "  u = [5.0];",
            "  C = [1.0, 0.0];",
            "  R = [10.0];",
            "  x0 = [60.0; 10.0];",
            "  x0_est = [10.0; 0.0];",
            "  P0 = [50.0, 0.0; 0.0, 0.01];",
            "  N = 500;",
            "  sigma = sqrt(diag(R));",
            "  t = 0.01 * (1:N);",
            "  x_true(:, 1) = x0;",
            "  for k = 2:N",
            "    x_true(:, k) = mat_mul(A, x_true(:, k - 1)) + mat_mul(G, u);",
            "  for k = 1:N",
            "    z(:, k) = mat_mul(C, x_true(:, k)) + sigma .* box_muller(size(sigma, 1));",
            "    x_pred = mat_mul(A, x_est(:, k - 1)) + mat_mul(G, u);",
            "    P_pred = mat_mul(mat_mul(A, P), A') + Q;",
            "    S = mat_mul(mat_mul(C, P_pred), C') + R;",
            "    K = mat_mul(mat_mul(P_pred, C'), gauss_jordan_inverse(S));",
            "    innovation = z(:, k) - mat_mul(C, x_pred);",
            "    x_est(:, k) = x_pred + mat_mul(K, innovation);",
            "    P = mat_mul(eye(2) - mat_mul(K, C), P_pred);",
            "  err = x_est - x_true;",
            "function n = box_muller(count)",
        ] {
            assert!(lines.contains(&expected), "missing line {expected:?}\n{source}");
        }
    }

    #[test]
    fn test_linear_source() {
        let source = linear().render();

        assert!(source.starts_with("function [t, z, x_true, x_est, err] = kalmanFilterSimulation()\n"));
        assert!(source.contains("  Q = [1e-6, 0.0; 0.0, 1e-6];\n"));
        assert!(source.contains("  t = 1:N;\n"));
        assert!(source.contains("    x_true(:, k) = mat_mul(A, x_true(:, k - 1));\n"));
        assert!(source.contains("    z(:, k) = mat_mul(C, x_true(:, k));\n"));
        assert!(!source.contains("box_muller"));
        assert!(!source.contains("sigma"));
        assert!(!source.contains("G = "));
    }

    #[test]
    fn test_render_is_pure() {
        assert_eq!(kinematic().render(), kinematic().render());
        assert_ne!(kinematic().render(), linear().render());
    }

    #[test]
    fn test_blocks_are_balanced() {
        for source in [kinematic().render(), linear().render()] {
            let openers = source
                .lines()
                .map(str::trim)
                .filter(|line| {
                    line.starts_with("function ")
                        || line.starts_with("for ")
                        || line.starts_with("if ")
                        || line.starts_with("while ")
                })
                .count();
            let closers = source.lines().filter(|line| line.trim() == "end").count();
            assert_eq!(openers, closers);
        }
    }

    #[test]
    fn test_operand_grouping() {
        let nested = Expr::Difference(
            Box::new(Expr::Var("a")),
            Box::new(Expr::Sum(Box::new(Expr::Var("b")), Box::new(Expr::Var("c")))),
        );
        assert_eq!(render_expr(&nested), "a - (b + c)");

        let transposed = Expr::Transpose(Box::new(nested));
        assert_eq!(render_expr(&transposed), "(a - (b + c))'");
    }
}
