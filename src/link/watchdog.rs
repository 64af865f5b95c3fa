//! Per-Link timer agent (spec §4.3). One task per `Link`, sleeping until the
//! next event of interest and re-examining state — grounded on the wider
//! transport stack's habit of giving each long-lived object its own
//! `tokio::spawn`ed maintenance loop rather than a shared ticker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::callbacks::ClosedReason;
use crate::packet::{PacketContext, PacketType};

use super::{Link, LinkStatus};

/// Spawns the watchdog task and returns its handle. Nothing currently keeps
/// the handle around past spawn (the task exits on its own once the Link
/// closes), but returning it lets tests await shutdown deterministically.
pub fn spawn_watchdog(link: Arc<Mutex<Link>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let sleep_for = {
                let mut guard = link.lock().await;
                match guard.watchdog_tick() {
                    Some(duration) => duration,
                    None => return,
                }
            };
            tokio::time::sleep(sleep_for).await;
        }
    })
}

impl Link {
    /// Runs one watchdog wake cycle and returns how long to sleep before the
    /// next one, or `None` once the Link is CLOSED and the task should exit.
    fn watchdog_tick(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let max_sleep = Duration::from_secs_f64(self.config.watchdog_max_sleep);

        self.expire_requests(now);

        let sleep_for = match self.status {
            LinkStatus::Closed => return None,

            LinkStatus::Pending | LinkStatus::Handshake => {
                let establishment_timeout =
                    self.config.per_hop * (self.hops.max(1) as f64) + self.config.keepalive_min;
                let deadline = self.request_time + Duration::from_secs_f64(establishment_timeout);
                if now >= deadline {
                    log::warn!(target: "rns_link", "link {} timed out establishing", self.link_id);
                    self.close(ClosedReason::Timeout);
                    return None;
                }
                Self::bounded_sleep(deadline - now, max_sleep)
            }

            LinkStatus::Active => {
                let last_any_inbound = self.last_any_inbound();
                let keepalive = Duration::from_secs_f64(self.keepalive);
                let stale_at = last_any_inbound + Duration::from_secs_f64(self.stale_time);

                if now >= last_any_inbound + keepalive {
                    if self.initiator {
                        let last_keepalive = self.last_keepalive.unwrap_or(self.created_at);
                        if now >= last_keepalive + keepalive {
                            self.enqueue(PacketType::Data, PacketContext::Keepalive, vec![0xFF]);
                            self.last_keepalive = Some(now);
                        }
                    }
                    if now >= stale_at {
                        log::debug!(target: "rns_link", "link {} went stale", self.link_id);
                        self.status = LinkStatus::Stale;
                        let grace = self.rtt.unwrap_or(self.config.keepalive_min)
                            * self.config.keepalive_timeout_factor
                            + self.config.stale_grace;
                        Self::bounded_sleep(Duration::from_secs_f64(grace), max_sleep)
                    } else {
                        Self::bounded_sleep((last_any_inbound + keepalive).saturating_duration_since(now), max_sleep)
                    }
                } else {
                    Self::bounded_sleep((last_any_inbound + keepalive).saturating_duration_since(now), max_sleep)
                }
            }

            LinkStatus::Stale => {
                log::debug!(target: "rns_link", "link {} closing after stale grace period", self.link_id);
                let plaintext = self.link_id.as_slice().to_vec();
                self.send_encrypted(PacketContext::LinkClose, &plaintext);
                self.close(ClosedReason::Timeout);
                return None;
            }
        };

        // The watchdog is also the single timer agent for request timeouts
        // (no per-request spawned task — see `request::expire_requests`), so
        // it must wake no later than the soonest pending deadline too.
        let sleep_for = match self.next_request_deadline() {
            Some(deadline) => sleep_for.min(Self::bounded_sleep(deadline.saturating_duration_since(now), max_sleep)),
            None => sleep_for,
        };

        Some(sleep_for)
    }

    fn last_any_inbound(&self) -> Instant {
        [self.last_inbound, self.last_proof, self.activated_at]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(self.created_at)
    }

    fn bounded_sleep(want: Duration, max: Duration) -> Duration {
        want.min(max).max(Duration::from_millis(1))
    }
}
