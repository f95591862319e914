use anyhow::Result;

use crate::accounts::create_user;
use crate::core::db::{async_db, initialize_db};

pub async fn run(db_path: &str, username: &str, email: &str) -> Result<()> {
    let db = async_db(db_path).await.expect("Failed to connect to db");
    db.call(|conn| {
        initialize_db(conn).expect("DB initialization failed");
        Ok(())
    })
    .await?;

    let user = create_user(&db, username, email).await?;
    println!(
        "Created user {} <{}> with id {}",
        user.username, user.email, user.id
    );

    Ok(())
}
