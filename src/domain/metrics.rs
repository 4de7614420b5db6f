//! Performance metrics over closed trades and the realized equity curve.
//!
//! Every ratio falls back to `0.0` on degenerate input (fewer than two equity
//! points, no trades, zero variance) instead of producing NaN.

use crate::domain::equity::{EquityPoint, drawdown_curve, equity_values};
use crate::domain::trade::Trade;

pub const PERIODS_PER_YEAR: f64 = 252.0;
pub const RISK_FREE_ANNUAL: f64 = 0.02;
const DAYS_PER_YEAR: f64 = 365.25;
const MIN_STDDEV: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metrics {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub net_profit: f64,
    /// Percent.
    pub total_return: f64,
    /// Percent, compounded over the equity curve's time span.
    pub annual_return: f64,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    /// Percent.
    pub win_rate: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub gross_profit: f64,
    /// Positive magnitude.
    pub gross_loss: f64,
    pub avg_win: f64,
    /// Positive magnitude.
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_trade_duration_hours: f64,
    pub total_commission: f64,
    pub total_slippage: f64,

    /// Percent.
    pub max_drawdown: f64,
    /// Longest run of equity points below the running peak.
    pub max_drawdown_duration: usize,
    /// Percent.
    pub volatility_annual: f64,
    /// Positive magnitude of the 5th percentile per-period return.
    pub var_95: f64,
    pub cvar_95: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub sqn: f64,
    /// Kelly fraction clipped to `[0, 0.5]`.
    pub kelly: f64,
    /// Unclipped Kelly fraction.
    pub kelly_raw: f64,
    pub recovery_factor: f64,
    pub ulcer_index: f64,
}

impl Metrics {
    pub fn compute(trades: &[Trade], equity_curve: &[EquityPoint], initial_capital: f64) -> Self {
        let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        let equity = equity_values(equity_curve);

        let mut m = Metrics {
            initial_capital,
            final_capital: equity.last().copied().unwrap_or(initial_capital),
            ..Default::default()
        };
        m.net_profit = m.final_capital - initial_capital;
        let total_return = if initial_capital > 0.0 {
            m.net_profit / initial_capital
        } else {
            0.0
        };
        m.total_return = total_return * 100.0;
        let annual_return = annualized_return(equity_curve, total_return);
        m.annual_return = annual_return * 100.0;

        m.compute_trade_stats(&closed);

        let drawdown = drawdown_curve(&equity);
        let max_dd = drawdown.iter().copied().fold(0.0, f64::max);
        m.max_drawdown = max_dd;
        m.max_drawdown_duration = longest_positive_run(&drawdown);
        m.ulcer_index = ulcer_index(&drawdown);

        let rets = returns(&equity);
        m.volatility_annual = stddev(&rets) * PERIODS_PER_YEAR.sqrt() * 100.0;
        let (var, cvar) = value_at_risk(&rets, 5.0);
        m.var_95 = var;
        m.cvar_95 = cvar;
        let rf = RISK_FREE_ANNUAL / PERIODS_PER_YEAR;
        m.sharpe_ratio = sharpe_ratio(&rets, rf);
        m.sortino_ratio = sortino_ratio(&rets, rf);

        let max_dd_decimal = max_dd / 100.0;
        if max_dd_decimal > 0.0 {
            m.calmar_ratio = annual_return / max_dd_decimal;
            m.recovery_factor = m.net_profit / max_dd_decimal;
        }
        m
    }

    fn compute_trade_stats(&mut self, trades: &[&Trade]) {
        let mut win_streak = 0usize;
        let mut loss_streak = 0usize;
        let mut total_hours = 0.0;

        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                self.winning_trades += 1;
                self.gross_profit += pnl;
                self.largest_win = self.largest_win.max(pnl);
                win_streak += 1;
                loss_streak = 0;
            } else if pnl < 0.0 {
                self.losing_trades += 1;
                self.gross_loss += pnl.abs();
                self.largest_loss = self.largest_loss.max(pnl.abs());
                loss_streak += 1;
                win_streak = 0;
            } else {
                self.breakeven_trades += 1;
                win_streak = 0;
                loss_streak = 0;
            }
            self.max_consecutive_wins = self.max_consecutive_wins.max(win_streak);
            self.max_consecutive_losses = self.max_consecutive_losses.max(loss_streak);
            total_hours += trade.duration_hours().unwrap_or(0.0);
            self.total_commission += trade.commission;
            self.total_slippage += trade.slippage;
        }

        self.total_trades = trades.len();
        if self.total_trades == 0 {
            return;
        }
        let n = self.total_trades as f64;
        let win_frac = self.winning_trades as f64 / n;
        let loss_frac = self.losing_trades as f64 / n;
        self.win_rate = win_frac * 100.0;
        self.avg_trade_duration_hours = total_hours / n;

        if self.winning_trades > 0 {
            self.avg_win = self.gross_profit / self.winning_trades as f64;
        }
        if self.losing_trades > 0 {
            self.avg_loss = self.gross_loss / self.losing_trades as f64;
        }
        self.profit_factor = profit_factor(self.gross_profit, self.gross_loss);
        self.expectancy = win_frac * self.avg_win - loss_frac * self.avg_loss;

        let pnl_pct: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
        self.sqn = system_quality_number(&pnl_pct);
        self.kelly_raw = kelly_criterion(win_frac, self.avg_win, self.avg_loss);
        self.kelly = self.kelly_raw.clamp(0.0, 0.5);
    }
}

/// Simple per-period returns; a non-positive base yields a zero return.
pub fn returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// `gross_profit / gross_loss`; infinite with profit and no loss.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

pub fn sharpe_ratio(returns: &[f64], risk_free_per_period: f64) -> f64 {
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free_per_period).collect();
    let sd = stddev(&excess);
    if sd < MIN_STDDEV {
        return 0.0;
    }
    mean(&excess) / sd * PERIODS_PER_YEAR.sqrt()
}

/// Like Sharpe with the deviation taken over negative excess returns only.
pub fn sortino_ratio(returns: &[f64], risk_free_per_period: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free_per_period).collect();
    let downside: Vec<f64> = excess.iter().copied().filter(|r| *r < 0.0).collect();
    let sd = stddev(&downside);
    if sd < MIN_STDDEV {
        return 0.0;
    }
    mean(&excess) / sd * PERIODS_PER_YEAR.sqrt()
}

/// Linear-interpolated percentile (`p` in 0..=100) of `values`.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Empirical VaR and CVaR at `pct` percent, as positive magnitudes.
pub fn value_at_risk(returns: &[f64], pct: f64) -> (f64, f64) {
    let Some(cutoff) = percentile(returns, pct) else {
        return (0.0, 0.0);
    };
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= cutoff).collect();
    (cutoff.abs(), mean(&tail).abs())
}

pub fn system_quality_number(pnl_pct: &[f64]) -> f64 {
    let sd = stddev(pnl_pct);
    if sd < MIN_STDDEV {
        return 0.0;
    }
    mean(pnl_pct) / sd * (pnl_pct.len() as f64).sqrt()
}

/// Unclipped Kelly fraction `w − (1 − w) / (avg_win / avg_loss)`.
///
/// `win_rate` is a fraction; zero when either average is not positive.
pub fn kelly_criterion(win_rate: f64, avg_win: f64, avg_loss: f64) -> f64 {
    if avg_win <= 0.0 || avg_loss <= 0.0 {
        return 0.0;
    }
    win_rate - (1.0 - win_rate) / (avg_win / avg_loss)
}

/// `√mean(dd²) × 100` with `drawdown` in percent.
pub fn ulcer_index(drawdown: &[f64]) -> f64 {
    if drawdown.is_empty() {
        return 0.0;
    }
    let mean_sq = drawdown.iter().map(|d| (d / 100.0).powi(2)).sum::<f64>() / drawdown.len() as f64;
    mean_sq.sqrt() * 100.0
}

fn longest_positive_run(drawdown: &[f64]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for &d in drawdown {
        if d > 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn annualized_return(curve: &[EquityPoint], total_return: f64) -> f64 {
    let (Some(first), Some(last)) = (curve.first(), curve.last()) else {
        return 0.0;
    };
    let years = (last.timestamp - first.timestamp).num_seconds() as f64 / (DAYS_PER_YEAR * 86_400.0);
    if years <= 0.0 || 1.0 + total_return <= 0.0 || !total_return.is_finite() {
        return 0.0;
    }
    let annual = (1.0 + total_return).powf(1.0 / years) - 1.0;
    if annual.is_finite() { annual } else { 0.0 }
}
