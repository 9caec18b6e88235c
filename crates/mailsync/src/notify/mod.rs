//! Push-notification intake: envelope decoding, receiver, job dispatch

mod dispatch;
mod receiver;

pub use dispatch::{JobSink, SyncDispatcher, SyncJob};
pub use receiver::{
    ChangeNotification, NotificationReceiver, PushEnvelope, PushMessage, decode_notification,
};
