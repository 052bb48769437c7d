//! Postgres store
//!
//! Tables live in the `backend` schema. The game and settings singletons are
//! the rows with `id = 1`. Share maps are stored as jsonb.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, PgExecutor, Row};
use std::time::Duration;
use tracing::{info, instrument};

use super::{
    AdditionalInfoStore, BalanceStore, BalanceTransactionStore, CompanySharePriceStore,
    CompanyStore, GameStore, SettingsStore, SettlementCommit, SettlementStore, TeamStore,
    TransactionWrite,
};
use crate::common::errors::{GameError, Result};
use crate::common::types::{
    AdditionalInfo, AdditionalInfoId, AdditionalInfoType, Balance, BalanceId, BalanceTransaction,
    Company, CompanyId, CompanyShare, Game, GameState, Round, Settings, Team, TeamId,
    TradeState, TransactionId,
};
use crate::config::types::DatabaseConfig;
use crate::ledger::{ShareChanges, TeamShares};

const SCHEMA: &str = r#"
create schema if not exists backend;

create table if not exists backend.game (
    id            int primary key,
    state         smallint not null,
    current_round int      not null,
    trade_state   smallint not null,
    current_game  bigint   not null
);
insert into backend.game (id, state, current_round, trade_state, current_game)
values (1, -1, 0, 0, 1)
on conflict (id) do nothing;

create table if not exists backend.settings (
    id                           int primary key,
    rounds_count                 int     not null,
    rounds_duration_seconds      bigint  not null,
    link_to_pdf                  text    not null,
    enable_random_events         boolean not null,
    default_balance_amount       bigint  not null,
    default_additional_info_cost bigint  not null
);

create table if not exists backend.balance (
    id     bigserial primary key,
    amount bigint not null check (amount >= 0)
);

create table if not exists backend.company (
    id       bigserial primary key,
    name     text not null,
    archived boolean
);

create table if not exists backend.company_share (
    id         bigserial primary key,
    company_id bigint not null references backend.company (id),
    round      int    not null,
    price      bigint not null,
    unique (company_id, round)
);

create table if not exists backend.additional_info (
    id          bigserial primary key,
    name        text     not null,
    description text     not null default '',
    type        smallint not null,
    cost        bigint   not null,
    company_id  bigint references backend.company (id),
    round       int      not null default 0
);

create table if not exists backend.team (
    id               bigserial primary key,
    created_at       timestamptz not null default now(),
    updated_at       timestamptz,
    name             text     not null,
    members          text[]   not null default '{}',
    credentials      text     not null,
    balance_id       bigint   not null references backend.balance (id),
    shares           jsonb    not null default '{}',
    additional_infos bigint[] not null default '{}',
    random_event_id  bigint,
    game_id          bigint   not null,
    unique (credentials, game_id)
);

create table if not exists backend.balance_transaction (
    id                 bigserial primary key,
    balance_id         bigint not null references backend.balance (id),
    round              int    not null,
    amount             bigint not null,
    details            jsonb,
    additional_info_id bigint,
    random_event_id    bigint
);
create unique index if not exists balance_transaction_shares_slot
    on backend.balance_transaction (balance_id, round)
    where additional_info_id is null and random_event_id is null;
"#;

/// Postgres implementation of every store trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the database section of the configuration
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect(&config.url)
            .await?;
        info!("successfully connected to database");
        Ok(Self::new(pool))
    }

    /// Create missing tables and seed the singleton rows.
    ///
    /// `seed` only applies when no settings row exists yet.
    pub async fn ensure_schema(&self, seed: &Settings) -> Result<()> {
        self.pool.execute(SCHEMA).await?;

        sqlx::query(
            "insert into backend.settings \
             values (1, $1, $2, $3, $4, $5, $6) \
             on conflict (id) do nothing",
        )
        .bind(seed.rounds_count)
        .bind(seed.round_duration.as_secs() as i64)
        .bind(&seed.link_to_pdf)
        .bind(seed.enable_random_events)
        .bind(seed.default_balance_amount)
        .bind(seed.default_additional_info_cost)
        .execute(&self.pool)
        .await?;

        info!("database schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn small_to_i8(value: i16) -> Result<i8> {
    i8::try_from(value).map_err(|_| GameError::Internal(format!("enum value {value} out of range")))
}

fn game_from_row(row: &PgRow) -> Result<Game> {
    Ok(Game {
        state: GameState::try_from(small_to_i8(row.try_get("state")?)?)?,
        current_round: row.try_get("current_round")?,
        trade_state: TradeState::try_from(small_to_i8(row.try_get("trade_state")?)?)?,
        current_game: row.try_get("current_game")?,
    })
}

fn team_from_row(row: &PgRow) -> Result<Team> {
    let shares: String = row.try_get("shares")?;
    Ok(Team {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        name: row.try_get("name")?,
        members: row.try_get("members")?,
        credentials: row.try_get("credentials")?,
        balance_id: row.try_get("balance_id")?,
        shares: serde_json::from_str::<TeamShares>(&shares)?,
        additional_info_ids: row.try_get("additional_infos")?,
        random_event_id: row.try_get("random_event_id")?,
        game_id: row.try_get("game_id")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<BalanceTransaction> {
    let details: Option<String> = row.try_get("details")?;
    Ok(BalanceTransaction {
        id: row.try_get("id")?,
        balance_id: row.try_get("balance_id")?,
        round: row.try_get("round")?,
        amount: row.try_get("amount")?,
        details: details
            .map(|json| serde_json::from_str::<ShareChanges>(&json))
            .transpose()?,
        additional_info_id: row.try_get("additional_info_id")?,
        random_event_id: row.try_get("random_event_id")?,
    })
}

fn info_from_row(row: &PgRow) -> Result<AdditionalInfo> {
    Ok(AdditionalInfo {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        info_type: AdditionalInfoType::try_from(small_to_i8(row.try_get("type")?)?)?,
        cost: row.try_get("cost")?,
        company_id: row.try_get("company_id")?,
        round: row.try_get("round")?,
    })
}

fn share_from_row(row: &PgRow) -> Result<CompanyShare> {
    Ok(CompanyShare {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        round: row.try_get("round")?,
        price: row.try_get("price")?,
    })
}

fn details_json(details: &Option<ShareChanges>) -> Result<Option<String>> {
    Ok(details.as_ref().map(serde_json::to_string).transpose()?)
}

const TEAM_COLUMNS: &str = "id, created_at, updated_at, name, members, credentials, balance_id, \
     shares::text as shares, additional_infos, random_event_id, game_id";

const TRANSACTION_COLUMNS: &str = "id, balance_id, round, amount, details::text as details, \
     additional_info_id, random_event_id";

const SHARES_SLOT: &str = "additional_info_id is null and random_event_id is null";

async fn update_team_with<'e, E: PgExecutor<'e>>(executor: E, team: &Team) -> Result<()> {
    let result = sqlx::query(
        "update backend.team \
         set name = $2, members = $3, shares = $4::jsonb, additional_infos = $5, \
             random_event_id = $6, updated_at = now() \
         where id = $1",
    )
    .bind(team.id)
    .bind(&team.name)
    .bind(&team.members)
    .bind(serde_json::to_string(&team.shares)?)
    .bind(&team.additional_info_ids)
    .bind(team.random_event_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(GameError::NothingUpdated(format!("team {}", team.id)));
    }
    Ok(())
}

async fn create_transaction_with<'e, E: PgExecutor<'e>>(
    executor: E,
    transaction: &BalanceTransaction,
) -> Result<TransactionId> {
    let id: i64 = sqlx::query_scalar(
        "insert into backend.balance_transaction \
             (balance_id, round, amount, details, additional_info_id, random_event_id) \
         values ($1, $2, $3, $4::jsonb, $5, $6) \
         returning id",
    )
    .bind(transaction.balance_id)
    .bind(transaction.round)
    .bind(transaction.amount)
    .bind(details_json(&transaction.details)?)
    .bind(transaction.additional_info_id)
    .bind(transaction.random_event_id)
    .fetch_one(executor)
    .await?;
    Ok(id)
}

async fn update_transaction_with<'e, E: PgExecutor<'e>>(
    executor: E,
    transaction: &BalanceTransaction,
) -> Result<()> {
    let result = sqlx::query(&format!(
        "update backend.balance_transaction \
         set amount = $3, details = $4::jsonb \
         where balance_id = $1 and round = $2 and {SHARES_SLOT}"
    ))
    .bind(transaction.balance_id)
    .bind(transaction.round)
    .bind(transaction.amount)
    .bind(details_json(&transaction.details)?)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(GameError::NothingUpdated(format!(
            "transaction of balance {} in round {}",
            transaction.balance_id, transaction.round
        )));
    }
    Ok(())
}

async fn delete_transaction_with<'e, E: PgExecutor<'e>>(
    executor: E,
    balance_id: BalanceId,
    round: Round,
) -> Result<()> {
    let result = sqlx::query(&format!(
        "delete from backend.balance_transaction \
         where balance_id = $1 and round = $2 and {SHARES_SLOT}"
    ))
    .bind(balance_id)
    .bind(round)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(GameError::NothingUpdated(format!(
            "transaction of balance {balance_id} in round {round}"
        )));
    }
    Ok(())
}

#[async_trait]
impl GameStore for PgStore {
    async fn get(&self) -> Result<Game> {
        let row = sqlx::query(
            "select state, current_round, trade_state, current_game from backend.game where id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GameError::NotFound("game".into()))?;
        game_from_row(&row)
    }

    async fn update(&self, game: &Game) -> Result<()> {
        let result = sqlx::query(
            "update backend.game \
             set state = $1, current_round = $2, trade_state = $3, current_game = $4 \
             where id = 1",
        )
        .bind(i16::from(i8::from(game.state)))
        .bind(game.current_round)
        .bind(i16::from(i8::from(game.trade_state)))
        .bind(game.current_game)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GameError::NothingUpdated("game".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn get(&self) -> Result<Settings> {
        let row = sqlx::query(
            "select rounds_count, rounds_duration_seconds, link_to_pdf, enable_random_events, \
                    default_balance_amount, default_additional_info_cost \
             from backend.settings where id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GameError::NotFound("settings".into()))?;

        let seconds: i64 = row.try_get("rounds_duration_seconds")?;
        Ok(Settings {
            rounds_count: row.try_get("rounds_count")?,
            round_duration: Duration::from_secs(seconds.max(0) as u64),
            link_to_pdf: row.try_get("link_to_pdf")?,
            enable_random_events: row.try_get("enable_random_events")?,
            default_balance_amount: row.try_get("default_balance_amount")?,
            default_additional_info_cost: row.try_get("default_additional_info_cost")?,
        })
    }

    async fn update(&self, settings: &Settings) -> Result<()> {
        let result = sqlx::query(
            "update backend.settings \
             set rounds_count = $1, rounds_duration_seconds = $2, link_to_pdf = $3, \
                 enable_random_events = $4, default_balance_amount = $5, \
                 default_additional_info_cost = $6 \
             where id = 1",
        )
        .bind(settings.rounds_count)
        .bind(settings.round_duration.as_secs() as i64)
        .bind(&settings.link_to_pdf)
        .bind(settings.enable_random_events)
        .bind(settings.default_balance_amount)
        .bind(settings.default_additional_info_cost)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GameError::NothingUpdated("settings".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TeamStore for PgStore {
    async fn create(&self, team: &Team) -> Result<TeamId> {
        let id: i64 = sqlx::query_scalar(
            "insert into backend.team \
                 (name, members, credentials, balance_id, shares, additional_infos, game_id) \
             values ($1, $2, $3, $4, $5::jsonb, $6, $7) \
             on conflict (credentials, game_id) do nothing \
             returning id",
        )
        .bind(&team.name)
        .bind(&team.members)
        .bind(&team.credentials)
        .bind(team.balance_id)
        .bind(serde_json::to_string(&team.shares)?)
        .bind(&team.additional_info_ids)
        .bind(team.game_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(GameError::DuplicateCredentials)?;
        Ok(id)
    }

    async fn update(&self, team: &Team) -> Result<()> {
        update_team_with(&self.pool, team).await
    }

    async fn get_by_id(&self, id: TeamId) -> Result<Team> {
        let row = sqlx::query(&format!("select {TEAM_COLUMNS} from backend.team where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("team {id}")))?;
        team_from_row(&row)
    }

    async fn get_by_credentials(&self, credentials: &str, game_id: i64) -> Result<Team> {
        let row = sqlx::query(&format!(
            "select {TEAM_COLUMNS} from backend.team where credentials = $1 and game_id = $2"
        ))
        .bind(credentials)
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GameError::NotFound("team with credentials".into()))?;
        team_from_row(&row)
    }

    async fn get_all_by_game_id(&self, game_id: i64) -> Result<Vec<Team>> {
        let rows = sqlx::query(&format!(
            "select {TEAM_COLUMNS} from backend.team where game_id = $1 order by id"
        ))
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(team_from_row).collect()
    }
}

#[async_trait]
impl BalanceStore for PgStore {
    async fn create(&self, amount: i64) -> Result<BalanceId> {
        let id: i64 = sqlx::query_scalar("insert into backend.balance (amount) values ($1) returning id")
            .bind(amount)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_by_id(&self, id: BalanceId) -> Result<Balance> {
        let amount: i64 = sqlx::query_scalar("select amount from backend.balance where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("balance {id}")))?;
        Ok(Balance { id, amount })
    }

    async fn update(&self, balance: &Balance) -> Result<()> {
        let result = sqlx::query("update backend.balance set amount = $2 where id = $1")
            .bind(balance.id)
            .bind(balance.amount)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(GameError::NothingUpdated(format!("balance {}", balance.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceTransactionStore for PgStore {
    async fn get(&self, balance_id: BalanceId, round: Round) -> Result<BalanceTransaction> {
        let row = sqlx::query(&format!(
            "select {TRANSACTION_COLUMNS} from backend.balance_transaction \
             where balance_id = $1 and round = $2 and {SHARES_SLOT}"
        ))
        .bind(balance_id)
        .bind(round)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            GameError::NotFound(format!("transaction of balance {balance_id} in round {round}"))
        })?;
        transaction_from_row(&row)
    }

    async fn create(&self, transaction: &BalanceTransaction) -> Result<TransactionId> {
        create_transaction_with(&self.pool, transaction).await
    }

    async fn update(&self, transaction: &BalanceTransaction) -> Result<()> {
        update_transaction_with(&self.pool, transaction).await
    }

    async fn delete(&self, balance_id: BalanceId, round: Round) -> Result<()> {
        delete_transaction_with(&self.pool, balance_id, round).await
    }
}

#[async_trait]
impl CompanyStore for PgStore {
    async fn get_all_not_archived(&self) -> Result<Vec<Company>> {
        let rows = sqlx::query(
            "select id, name, coalesce(archived, false) as archived from backend.company \
             where not coalesce(archived, false) order by id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Company {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    archived: row.try_get("archived")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CompanySharePriceStore for PgStore {
    async fn get_prices_by_company_ids_and_round(
        &self,
        company_ids: &[CompanyId],
        round: Round,
    ) -> Result<Vec<CompanyShare>> {
        let rows = sqlx::query(
            "select id, company_id, round, price from backend.company_share \
             where company_id = any($1) and round = $2",
        )
        .bind(company_ids)
        .bind(round)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(share_from_row).collect()
    }

    async fn get_all_by_round(&self, round: Round) -> Result<Vec<CompanyShare>> {
        let rows = sqlx::query(
            "select cs.id, cs.company_id, cs.round, cs.price \
             from backend.company_share cs \
             join backend.company c on c.id = cs.company_id \
             where cs.round = $1 and not coalesce(c.archived, false)",
        )
        .bind(round)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(share_from_row).collect()
    }
}

#[async_trait]
impl AdditionalInfoStore for PgStore {
    async fn get_by_id(&self, id: AdditionalInfoId) -> Result<AdditionalInfo> {
        let row = sqlx::query(
            "select id, name, description, type, cost, company_id, round \
             from backend.additional_info where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GameError::NotFound(format!("additional info {id}")))?;
        info_from_row(&row)
    }

    async fn get_by_ids(&self, ids: &[AdditionalInfoId]) -> Result<Vec<AdditionalInfo>> {
        let rows = sqlx::query(
            "select id, name, description, type, cost, company_id, round \
             from backend.additional_info where id = any($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(info_from_row).collect()
    }

    async fn get_all_actual_by_type(&self, info_type: AdditionalInfoType) -> Result<Vec<AdditionalInfo>> {
        let rows = sqlx::query(
            "select ai.id, ai.name, ai.description, ai.type, ai.cost, ai.company_id, ai.round \
             from backend.additional_info ai \
             left join backend.company c on c.id = ai.company_id \
             where ai.type = $1 and not coalesce(c.archived, false) \
             order by ai.id",
        )
        .bind(i16::from(i8::from(info_type)))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(info_from_row).collect()
    }

    async fn update(&self, info: &AdditionalInfo) -> Result<()> {
        let result = sqlx::query(
            "update backend.additional_info \
             set name = $2, description = $3, type = $4, cost = $5, company_id = $6, round = $7 \
             where id = $1",
        )
        .bind(info.id)
        .bind(&info.name)
        .bind(&info.description)
        .bind(i16::from(i8::from(info.info_type)))
        .bind(info.cost)
        .bind(info.company_id)
        .bind(info.round)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(GameError::NothingUpdated(format!("additional info {}", info.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for PgStore {
    #[instrument(skip(self, commit), fields(balance_id = commit.balance_id))]
    async fn commit(&self, commit: &SettlementCommit) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("update backend.balance set amount = $2 where id = $1 and amount = $3")
            .bind(commit.balance_id)
            .bind(commit.new_amount)
            .bind(commit.expected_amount)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(GameError::ConcurrentModification {
                balance_id: commit.balance_id,
            });
        }

        match &commit.transaction {
            TransactionWrite::Create(transaction) => {
                create_transaction_with(&mut *tx, transaction).await?;
            }
            TransactionWrite::Update(transaction) => {
                update_transaction_with(&mut *tx, transaction).await?
            }
            TransactionWrite::Delete { balance_id, round } => {
                delete_transaction_with(&mut *tx, *balance_id, *round).await?
            }
        }

        update_team_with(&mut *tx, &commit.team).await?;

        // dropping `tx` on any early return above rolls back
        tx.commit().await?;
        Ok(())
    }
}
