//! Prompt assembly
//!
//! The completion request is always, in order:
//! 1. the role-grant message (user role)
//! 2. the restatement of the subject question (assistant role)
//! 3. the live conversation minus its bootstrap question, answers as user
//!    messages and questions as assistant messages
//! 4. the new answer (user role)
//!
//! The bootstrap question is skipped in step 3 because step 2 already carries it.

use interviewer_sdk::types::{ChatContent, ChatEntry, Subject};

use crate::llm::Message;

/// Instructs the model to act as a CS interviewer and fixes the reply format
pub const ROLE_GRANT_MESSAGE: &str = "당신은 이제부터 Computer Science에 대해 질문하는 면접관이다.\n\
당신이 안내한 질문에 대해 내가 답변을 하면, 그에 대한 점수를 그동안 해왔던 답변도 포함하여 10점 단위로 평가 및 이유와 공부할 수 있는 키워드, 꼬리 질문을 제시해주길 바란다.\n\
\n\
점수에 대한 기준은 다음과 같다.\n\
(0: 기초 부족 혹은 적절한 대답이 아님, 10~30: 기초 수준만 아는 상태, 40~60: 어느 정도 알고 있음, 70~90: 어느 정도 깊게 알고 있음, 100: 매우 깊게 알고 있음)\n\
\n\
답변 형식은 다음과 같다. (매우 중요: 내가 어떠한 답변을 해도 답변 내용에 따라 아래의 형식을 줄바꿈하여 맞추고, 면접관은 당신은 직접적인 정답을 제공해서는 안된다.)\n\
\n\
답변에 대한 점수: nn점\n\
이유: ~~에 대한 설명은 부족합니다 / ~~에 대한 설명은 틀렸습니다 / ~~에 대해 더 깊게 공부하세요.\n\
공부할 수 있는 키워드: ~~ / ~~ / ~~\n\
꼬리 질문: ~~에 대해 더 깊게 설명해보세요.";

/// The interviewer's acknowledgement, ending with the subject question
pub fn restatement_message(question: &str) -> String {
    format!(
        "네, 알겠습니다. 제공해주신 형식에 맞추어 답변하는 면접관 역할을 수행하고, 질문에 대한 답은 제공하지 않겠습니다.\n\
         제가 면접관으로 질문드릴 내용은 다음과 같습니다.\n\
         \n\
         질문: {}",
        question
    )
}

/// Build the ordered message list for one turn
pub fn build_request_messages(
    subject: &Subject,
    conversation: &[ChatEntry],
    answer: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(conversation.len() + 2);

    messages.push(Message::user(ROLE_GRANT_MESSAGE));
    messages.push(Message::assistant(restatement_message(&subject.question)));

    messages.extend(conversation.iter().skip(1).map(|entry| match &entry.content {
        ChatContent::Answer { message, .. } => Message::user(message.as_str()),
        ChatContent::Question { message } => Message::assistant(message.as_str()),
    }));

    messages.push(Message::user(answer));
    messages
}
