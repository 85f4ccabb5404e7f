//! Durable store collaborator.
//!
//! REST handlers write here first and only then notify through the bridge.
//! [`MemoryStore`] keeps everything in process; a document database plugs in
//! behind the same [`Store`] trait.

use async_trait::async_trait;
use ember_protocol::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::RwLock;

const DAY_MS: u64 = 86_400_000;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: Option<String>,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: u64,
    pub from: UserId,
    pub to: UserId,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub read: bool,
}

/// Subscription plans on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Monthly,
    Yearly,
}

impl Plan {
    /// Parse a plan name as sent by clients.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "monthly" => Some(Plan::Monthly),
            "yearly" => Some(Plan::Yearly),
            _ => None,
        }
    }

    /// How long one purchase lasts.
    #[must_use]
    pub fn days(self) -> u64 {
        match self {
            Plan::Monthly => 30,
            Plan::Yearly => 365,
        }
    }
}

/// A paid subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub plan: Plan,
    /// Milliseconds since the Unix epoch.
    pub start_date: u64,
    /// Milliseconds since the Unix epoch.
    pub end_date: u64,
}

impl Subscription {
    /// A fresh subscription to `plan` beginning at `now`.
    #[must_use]
    pub fn starting(plan: Plan, now: u64) -> Self {
        Self {
            plan,
            start_date: now,
            end_date: now + plan.days() * DAY_MS,
        }
    }

    /// Premium until `end_date`, inclusive.
    #[must_use]
    pub fn is_active_at(&self, now: u64) -> bool {
        self.end_date >= now
    }
}

/// What a user did to another user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchAction {
    Like,
    Dislike,
}

impl MatchAction {
    /// Past tense, as shown to the client.
    #[must_use]
    pub fn past_tense(self) -> &'static str {
        match self {
            MatchAction::Like => "liked",
            MatchAction::Dislike => "disliked",
        }
    }
}

/// Result of [`Store::record_action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Persisted. `mutual` when this like completed a match.
    Recorded { mutual: bool },
    /// The same action was already on record; nothing changed.
    AlreadyDone,
    /// The daily like quota is used up; nothing changed.
    LimitReached,
}

/// The narrow slice of the document store the REST layer needs.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create or rename a user.
    async fn upsert_user(&self, user: &UserId, name: Option<String>) -> Result<UserProfile, StoreError>;

    /// Look up a user.
    async fn find_user(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError>;

    /// Persist an unread message.
    async fn save_message(
        &self,
        from: &UserId,
        to: &UserId,
        message: String,
        now: u64,
    ) -> Result<ChatMessage, StoreError>;

    /// Every message between two users, oldest first.
    async fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<ChatMessage>, StoreError>;

    /// Mark what `sender` sent `reader` as read. Returns how many changed.
    async fn mark_read(&self, reader: &UserId, sender: &UserId) -> Result<usize, StoreError>;

    /// Unread message counts addressed to `user`, by sender.
    async fn unread_counts(&self, user: &UserId) -> Result<BTreeMap<UserId, usize>, StoreError>;

    /// Everyone `user` has exchanged messages with.
    async fn conversation_partners(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError>;

    /// The user's subscription, whether or not it is still active.
    async fn current_subscription(&self, user: &UserId) -> Result<Option<Subscription>, StoreError>;

    /// Attach or replace a user's subscription.
    async fn set_subscription(&self, user: &UserId, subscription: Subscription) -> Result<(), StoreError>;

    /// Record a like or dislike.
    ///
    /// `daily_limit` is `None` for premium users. The quota counts likes per
    /// UTC day and is checked and consumed atomically with the write.
    async fn record_action(
        &self,
        user: &UserId,
        target: &UserId,
        action: MatchAction,
        daily_limit: Option<u32>,
        now: u64,
    ) -> Result<ActionOutcome, StoreError>;

    /// Everyone `user` has not yet liked or disliked, excluding `user`.
    async fn candidates(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError>;

    /// Users who liked `user` and were liked back.
    async fn friends(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError>;

    /// Users who liked `user` and have not been liked back.
    async fn requests(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError>;
}

#[derive(Debug, Default)]
struct UserRecord {
    name: Option<String>,
    likes: BTreeSet<UserId>,
    dislikes: BTreeSet<UserId>,
    daily_like_count: u32,
    like_day: Option<u64>,
    subscription: Option<Subscription>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, UserRecord>,
    messages: Vec<ChatMessage>,
    next_message_id: u64,
}

impl Inner {
    fn profile(&self, id: &UserId) -> UserProfile {
        UserProfile {
            id: id.clone(),
            name: self.users.get(id).and_then(|u| u.name.clone()),
        }
    }

    fn likes(&self, user: &UserId, target: &UserId) -> bool {
        self.users
            .get(user)
            .is_some_and(|record| record.likes.contains(target))
    }

    /// Users whose like list contains `user`, sorted by id.
    fn admirers(&self, user: &UserId) -> Vec<UserId> {
        let mut admirers: Vec<UserId> = self
            .users
            .iter()
            .filter(|(_, record)| record.likes.contains(user))
            .map(|(id, _)| id.clone())
            .collect();
        admirers.sort();
        admirers
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, user: &UserId, name: Option<String>) -> Result<UserProfile, StoreError> {
        let mut inner = self.inner.write().await;
        inner.users.entry(user.clone()).or_default().name = name;
        Ok(inner.profile(user))
    }

    async fn find_user(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.contains_key(user).then(|| inner.profile(user)))
    }

    async fn save_message(
        &self,
        from: &UserId,
        to: &UserId,
        message: String,
        now: u64,
    ) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_message_id += 1;
        let saved = ChatMessage {
            id: inner.next_message_id,
            from: from.clone(),
            to: to.clone(),
            message,
            timestamp: now,
            read: false,
        };
        inner.messages.push(saved.clone());
        Ok(saved)
    }

    async fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        let mut messages: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| (&m.from == a && &m.to == b) || (&m.from == b && &m.to == a))
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.timestamp, m.id));
        Ok(messages)
    }

    async fn mark_read(&self, reader: &UserId, sender: &UserId) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let mut marked = 0;
        for message in inner
            .messages
            .iter_mut()
            .filter(|m| &m.from == sender && &m.to == reader && !m.read)
        {
            message.read = true;
            marked += 1;
        }
        Ok(marked)
    }

    async fn unread_counts(&self, user: &UserId) -> Result<BTreeMap<UserId, usize>, StoreError> {
        let inner = self.inner.read().await;
        let mut counts = BTreeMap::new();
        for message in inner.messages.iter().filter(|m| &m.to == user && !m.read) {
            *counts.entry(message.from.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn conversation_partners(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        let partners: BTreeSet<&UserId> = inner
            .messages
            .iter()
            .filter_map(|m| {
                if &m.from == user {
                    Some(&m.to)
                } else if &m.to == user {
                    Some(&m.from)
                } else {
                    None
                }
            })
            .filter(|partner| *partner != user)
            .collect();
        Ok(partners.into_iter().map(|id| inner.profile(id)).collect())
    }

    async fn current_subscription(&self, user: &UserId) -> Result<Option<Subscription>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(user).and_then(|u| u.subscription.clone()))
    }

    async fn set_subscription(&self, user: &UserId, subscription: Subscription) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.users.entry(user.clone()).or_default().subscription = Some(subscription);
        Ok(())
    }

    async fn record_action(
        &self,
        user: &UserId,
        target: &UserId,
        action: MatchAction,
        daily_limit: Option<u32>,
        now: u64,
    ) -> Result<ActionOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner.users.entry(user.clone()).or_default();

        let already = match action {
            MatchAction::Like => record.likes.contains(target),
            MatchAction::Dislike => record.dislikes.contains(target),
        };
        if already {
            return Ok(ActionOutcome::AlreadyDone);
        }

        if let Some(limit) = daily_limit {
            let today = now / DAY_MS;
            if record.like_day != Some(today) {
                record.like_day = Some(today);
                record.daily_like_count = 0;
            }
            if action == MatchAction::Like && record.daily_like_count >= limit {
                return Ok(ActionOutcome::LimitReached);
            }
        }

        match action {
            MatchAction::Like => {
                record.likes.insert(target.clone());
                if daily_limit.is_some() {
                    record.daily_like_count += 1;
                }
            }
            MatchAction::Dislike => {
                record.dislikes.insert(target.clone());
            }
        }

        let mutual = action == MatchAction::Like && inner.likes(target, user);
        Ok(ActionOutcome::Recorded { mutual })
    }

    async fn candidates(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        let seen = inner.users.get(user);
        let mut candidates: Vec<UserProfile> = inner
            .users
            .keys()
            .filter(|id| *id != user)
            .filter(|id| !seen.is_some_and(|r| r.likes.contains(*id) || r.dislikes.contains(*id)))
            .map(|id| inner.profile(id))
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(candidates)
    }

    async fn friends(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .admirers(user)
            .iter()
            .filter(|admirer| inner.likes(user, admirer))
            .map(|admirer| inner.profile(admirer))
            .collect())
    }

    async fn requests(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .admirers(user)
            .iter()
            .filter(|admirer| !inner.likes(user, admirer))
            .map(|admirer| inner.profile(admirer))
            .collect())
    }
}
