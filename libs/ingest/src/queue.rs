use std::future::poll_fn;
use std::task::{Context, Poll};

use tokio::sync::mpsc;

// ═══════════════════════════════════════════════════════════════
//  Drop-on-full enqueue
// ═══════════════════════════════════════════════════════════════

/// Результат неблокирующей отправки в bounded очередь.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Sent,
    /// Очередь полна — значение отброшено.
    Dropped,
    /// Получатель закрыт — отправлять больше некуда.
    Closed,
}

/// try_send(): никогда не ждёт. Вызывающий обязан обработать `Dropped`.
pub fn try_enqueue<T>(tx: &mpsc::Sender<T>, val: T) -> Enqueue {
    match tx.try_send(val) {
        Ok(()) => Enqueue::Sent,
        Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Dropped,
        Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Merge — fan-in N receivers → один потребитель
// ═══════════════════════════════════════════════════════════════

/// Слияние нескольких bounded очередей: `recv()` отдаёт то, что пришло
/// первым в любой из них. Порядок между очередями не гарантируется,
/// порядок внутри одной очереди сохраняется.
///
/// Опрос начинается со следующей после последней отдавшей очереди,
/// чтобы активный источник не вытеснял остальные.
pub struct Merge<T> {
    receivers: Vec<mpsc::Receiver<T>>,
    cursor: usize,
}

impl<T> Merge<T> {
    pub fn new(receivers: Vec<mpsc::Receiver<T>>) -> Self {
        Self { receivers, cursor: 0 }
    }

    /// `None` — все отправители закрыты и очереди вычитаны.
    pub async fn recv(&mut self) -> Option<T> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut polled = 0;
        while polled < self.receivers.len() {
            let idx = self.cursor % self.receivers.len();
            match self.receivers[idx].poll_recv(cx) {
                Poll::Ready(Some(item)) => {
                    self.cursor = idx + 1;
                    return Poll::Ready(Some(item));
                }
                Poll::Ready(None) => {
                    // swap_remove переставляет очереди: пройти все заново,
                    // иначе какая-то может остаться без зарегистрированного waker'а.
                    self.receivers.swap_remove(idx);
                    polled = 0;
                }
                Poll::Pending => {
                    self.cursor = idx + 1;
                    polled += 1;
                }
            }
        }

        if self.receivers.is_empty() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}
