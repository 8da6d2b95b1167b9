use crate::{
    config::SimulationConfig,
    data::MarketBar,
    engines::generation::StrategyParams,
    error::{EvoError, Result},
    types::{ExitReason, Trade},
};
use std::collections::VecDeque;
use std::time::Instant;

/// Bars between deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 64;

/// Per-bar P&L and bookkeeping for one symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolRun {
    pub symbol: String,
    pub notional: f64,
    /// `(timestamp, pnl)` for every usable bar.
    pub pnl: Vec<(i64, f64)>,
    pub trades: Vec<Trade>,
    pub missing_bars: usize,
    pub total_bars: usize,
}

struct Position {
    entry_bar: usize,
    trade_pnl: f64,
    fees: f64,
    /// Cumulative log move since the last re-hedge.
    unhedged_move: f64,
    bars_since_hedge: usize,
}

/// Short-premium options book on one underlying, delta hedged on a fixed
/// cadence.
///
/// The book sells premium at a quoted `spread_ratio` and earns carry on its
/// notional each bar:
///
/// ```text
/// carry = N * dt * (base_edge * exp(-((s - s_opt) / tol)^2)
///                   + theta_decay_rate * iv
///                   + iv_skew_sensitivity * max(0, iv - rv))
/// ```
///
/// and loses `0.5 * gamma_scale * N * (m_t^2 - m_{t-1}^2)` on the unhedged
/// cumulative move `m`. Every `hedge_frequency` bars the move is flattened at
/// `hedge_cost_rate * N * |gamma_scale * m|`.
pub struct OptionsBook<'a> {
    params: &'a StrategyParams,
    sim: &'a SimulationConfig,
    run: SymbolRun,
    position: Option<Position>,
    returns: VecDeque<f64>,
    last_price: Option<f64>,
    dt: f64,
}

impl<'a> OptionsBook<'a> {
    pub fn new(
        symbol: &str,
        notional: f64,
        params: &'a StrategyParams,
        sim: &'a SimulationConfig,
    ) -> Self {
        Self {
            params,
            sim,
            run: SymbolRun {
                symbol: symbol.to_string(),
                notional,
                ..SymbolRun::default()
            },
            position: None,
            returns: VecDeque::with_capacity(params.volatility_lookback + 1),
            last_price: None,
            dt: 1.0 / sim.bars_per_year,
        }
    }

    /// Run the book over a symbol's bars, checking `deadline` periodically.
    pub fn simulate(
        mut self,
        bars: &[MarketBar],
        deadline: Option<(Instant, Instant)>,
    ) -> Result<SymbolRun> {
        for (i, bar) in bars.iter().enumerate() {
            if i % DEADLINE_CHECK_INTERVAL == 0 {
                if let Some((started, deadline)) = deadline {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(EvoError::EvaluationTimeout {
                            elapsed_ms: now.duration_since(started).as_millis(),
                            budget_ms: deadline.duration_since(started).as_millis(),
                        });
                    }
                }
            }
            self.process_bar(i, bar);
        }
        let last_bar = bars.len().saturating_sub(1);
        self.close_position(last_bar, ExitReason::EndOfData);
        Ok(self.run)
    }

    pub fn process_bar(&mut self, bar_index: usize, bar: &MarketBar) {
        self.run.total_bars += 1;
        let Some((price, iv)) = bar.usable() else {
            self.run.missing_bars += 1;
            return;
        };

        let log_return = self.last_price.map(|last| (price / last).ln());
        self.last_price = Some(price);
        if let Some(r) = log_return {
            self.returns.push_back(r);
            while self.returns.len() > self.params.volatility_lookback {
                self.returns.pop_front();
            }
        }

        let realized_vol = self.realized_vol();
        let regime_ok = realized_vol <= self.params.gamma_threshold
            && self.lag_one_autocorrelation().abs() <= self.params.correlation_threshold;

        let mut bar_pnl = 0.0;
        if self.position.is_some() {
            bar_pnl = self.accrue(log_return.unwrap_or(0.0), iv, realized_vol);
            self.check_exit(bar_index, regime_ok);
        } else if regime_ok {
            self.open_position(bar_index);
        }

        self.run.pnl.push((bar.timestamp, bar_pnl));
    }

    fn accrue(&mut self, log_return: f64, iv: f64, realized_vol: f64) -> f64 {
        let notional = self.run.notional;
        let p = self.params;
        let sim = self.sim;
        let Some(pos) = self.position.as_mut() else {
            return 0.0;
        };

        let quote_efficiency =
            (-((p.spread_ratio - sim.optimal_spread_ratio) / sim.spread_tolerance).powi(2)).exp();
        let carry = notional
            * self.dt
            * (sim.base_edge * quote_efficiency
                + p.theta_decay_rate * iv
                + p.iv_skew_sensitivity * (iv - realized_vol).max(0.0));

        let prev_move = pos.unhedged_move;
        pos.unhedged_move += log_return;
        let gamma_pnl =
            -0.5 * sim.gamma_scale * notional * (pos.unhedged_move.powi(2) - prev_move.powi(2));

        let mut pnl = carry + gamma_pnl;
        pos.bars_since_hedge += 1;
        if pos.bars_since_hedge >= p.hedge_frequency {
            let cost = sim.hedge_cost_rate * notional * (sim.gamma_scale * pos.unhedged_move).abs();
            pnl -= cost;
            pos.fees += cost;
            pos.unhedged_move = 0.0;
            pos.bars_since_hedge = 0;
        }

        pos.trade_pnl += pnl;
        pnl
    }

    fn check_exit(&mut self, bar_index: usize, regime_ok: bool) {
        let Some(pos) = &self.position else {
            return;
        };
        let trade_return = pos.trade_pnl / self.run.notional;

        if trade_return <= -self.params.stop_loss_threshold {
            self.close_position(bar_index, ExitReason::StopLoss);
        } else if trade_return >= self.params.take_profit_threshold {
            self.close_position(bar_index, ExitReason::TakeProfit);
            // Bank the profit and keep quoting.
            if regime_ok {
                self.open_position(bar_index);
            }
        } else if !regime_ok {
            self.close_position(bar_index, ExitReason::RegimeFilter);
        }
    }

    fn open_position(&mut self, bar_index: usize) {
        self.position = Some(Position {
            entry_bar: bar_index,
            trade_pnl: 0.0,
            fees: 0.0,
            unhedged_move: 0.0,
            bars_since_hedge: 0,
        });
    }

    fn close_position(&mut self, bar_index: usize, reason: ExitReason) {
        if let Some(pos) = self.position.take() {
            // A roll on the final bar never held any risk.
            if reason == ExitReason::EndOfData && pos.entry_bar == bar_index {
                return;
            }
            self.run.trades.push(Trade {
                symbol: self.run.symbol.clone(),
                entry_bar: pos.entry_bar,
                exit_bar: bar_index,
                notional: self.run.notional,
                profit: pos.trade_pnl,
                exit_reason: reason,
                fees: pos.fees,
            });
        }
    }

    /// Annualized standard deviation of the lookback log returns.
    fn realized_vol(&self) -> f64 {
        let n = self.returns.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.returns.iter().sum::<f64>() / n as f64;
        let var = self.returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        (var * self.sim.bars_per_year).sqrt()
    }

    fn lag_one_autocorrelation(&self) -> f64 {
        let n = self.returns.len();
        if n < 3 {
            return 0.0;
        }
        let mean = self.returns.iter().sum::<f64>() / n as f64;
        let denom: f64 = self.returns.iter().map(|r| (r - mean).powi(2)).sum();
        if denom < 1e-18 {
            return 0.0;
        }
        let num: f64 = self
            .returns
            .iter()
            .zip(self.returns.iter().skip(1))
            .map(|(a, b)| (a - mean) * (b - mean))
            .sum();
        num / denom
    }
}
