use crate::DomainResult;
use crate::guest::GuestUser;

pub trait GuestRepository: Send + Sync {
    fn get_by_user_id(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<GuestUser>>>;

    fn create_guest(
        &self,
        guest: &GuestUser,
    ) -> crate::ports::BoxFuture<'_, DomainResult<GuestUser>>;
}
